//! RPC Surface (C7): `CreatePaymentIntent` and
//! `GetPaymentUrlByIdempotencyKey`; request validation and error mapping
//! (spec §4.7). Served as Axum JSON handlers rather than gRPC, since
//! nothing in this service's lineage carries a tonic/prost server stack
//! (see DESIGN.md).

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

use crate::adapters::AdapterRegistry;
use crate::domain::{Currency, PaymentStatus, Provider};
use crate::lifecycle::{CreateIntentInput, LifecycleEngine, LifecycleError, Store};

/// Shared application state injected into every Axum handler.
pub struct AppState<S: Store> {
    pub lifecycle: Arc<LifecycleEngine<S>>,
    pub adapters: Arc<AdapterRegistry>,
}

impl<S: Store> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            lifecycle: self.lifecycle.clone(),
            adapters: self.adapters.clone(),
        }
    }
}

/// Business error codes (spec §4.7).
const BUSINESS_CODE_NOT_FOUND: u32 = 20000;

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: &'static str,
    business_code: Option<u32>,
    message: String,
}

fn error_response(status: StatusCode, code: &'static str, business_code: Option<u32>, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorBody {
            code,
            business_code,
            message: message.into(),
        }),
    )
        .into_response()
}

impl From<LifecycleError> for Response {
    fn from(error: LifecycleError) -> Self {
        match error {
            LifecycleError::PaymentNotFound => error_response(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                Some(BUSINESS_CODE_NOT_FOUND),
                "payment not found",
            ),
            LifecycleError::Adapter(adapter_error) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL",
                None,
                adapter_error.to_string(),
            ),
            LifecycleError::Store(store_error) => error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL",
                None,
                store_error.to_string(),
            ),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct CreatePaymentIntentRequest {
    pub order_code: String,
    pub amount_cents: i64,
    pub currency: Currency,
    pub provider: Provider,
    pub idempotency_key: String,
    pub redirect_url: String,
    pub timeout_seconds: i32,
}

#[derive(Debug, Serialize)]
pub struct CreatePaymentIntentResponse {
    pub payment_url: String,
}

impl CreatePaymentIntentRequest {
    fn validate(&self) -> Result<(), Response> {
        if self.amount_cents <= 0 {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "INVALID_ARGUMENT",
                None,
                "amountCents must be positive",
            ));
        }
        if self.order_code.is_empty() {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "INVALID_ARGUMENT",
                None,
                "orderCode must not be empty",
            ));
        }
        if self.idempotency_key.is_empty() {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "INVALID_ARGUMENT",
                None,
                "idempotencyKey must not be empty",
            ));
        }
        if url::Url::parse(&self.redirect_url).is_err() {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "INVALID_ARGUMENT",
                None,
                "redirectUrl must be a valid URL",
            ));
        }
        if self.timeout_seconds <= 0 {
            return Err(error_response(
                StatusCode::BAD_REQUEST,
                "INVALID_ARGUMENT",
                None,
                "timeoutSeconds must be positive",
            ));
        }
        Ok(())
    }
}

/// `POST /payments`: `CreatePaymentIntent` (spec §4.7, §6).
pub async fn create_payment_intent<S: Store + 'static>(
    State(state): State<AppState<S>>,
    Json(request): Json<CreatePaymentIntentRequest>,
) -> Response {
    if let Err(response) = request.validate() {
        return response;
    }

    let result = state
        .lifecycle
        .create_intent(CreateIntentInput {
            amount_cents: request.amount_cents,
            order_code: request.order_code,
            currency: request.currency,
            provider: request.provider,
            idempotency_key: request.idempotency_key,
            redirect_url: request.redirect_url,
            timeout_seconds: request.timeout_seconds,
            metadata: serde_json::json!({}),
        })
        .await;

    match result {
        Ok(payment_url) => Json(CreatePaymentIntentResponse { payment_url }).into_response(),
        Err(error) => error.into(),
    }
}

#[derive(Debug, Deserialize)]
pub struct GetPaymentUrlQuery {
    pub idempotency_key: String,
}

/// Wire status for `GetPaymentUrlByIdempotencyKey` (spec §6): closed to
/// `{PENDING, COMPLETED, FAILED}`. `Cancelled` has no RPC-reachable path
/// (`cancel_by_order_code` is engine-level only) but is mapped to `FAILED`
/// rather than left unrepresentable, since the wire contract names only
/// these three values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentUrlStatus {
    Pending,
    Completed,
    Failed,
}

impl From<PaymentStatus> for PaymentUrlStatus {
    fn from(status: PaymentStatus) -> Self {
        match status {
            PaymentStatus::Pending => PaymentUrlStatus::Pending,
            PaymentStatus::Completed => PaymentUrlStatus::Completed,
            PaymentStatus::Failed | PaymentStatus::Cancelled => PaymentUrlStatus::Failed,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct GetPaymentUrlResponse {
    pub payment_url: String,
    pub status: PaymentUrlStatus,
}

/// `GET /payments?idempotency_key=...`: `GetPaymentUrlByIdempotencyKey`
/// (spec §4.7, §6).
pub async fn get_payment_url_by_idempotency_key<S: Store + 'static>(
    State(state): State<AppState<S>>,
    axum::extract::Query(query): axum::extract::Query<GetPaymentUrlQuery>,
) -> Response {
    if query.idempotency_key.is_empty() {
        return error_response(
            StatusCode::BAD_REQUEST,
            "INVALID_ARGUMENT",
            None,
            "idempotencyKey must not be empty",
        );
    }

    match state
        .lifecycle
        .find_by_idempotency_key(&query.idempotency_key)
        .await
    {
        Ok(Some(payment)) => Json(GetPaymentUrlResponse {
            payment_url: payment.payment_url,
            status: payment.status.into(),
        })
        .into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            "NOT_FOUND",
            Some(BUSINESS_CODE_NOT_FOUND),
            "payment not found",
        ),
        Err(error) => error.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_request() -> CreatePaymentIntentRequest {
        CreatePaymentIntentRequest {
            order_code: "o1".into(),
            amount_cents: 100_000,
            currency: Currency::Vnd,
            provider: Provider::Zalopay,
            idempotency_key: "k1".into(),
            redirect_url: "https://example.com/return".into(),
            timeout_seconds: 900,
        }
    }

    #[test]
    fn valid_request_passes_validation() {
        assert!(valid_request().validate().is_ok());
    }

    #[test]
    fn non_positive_amount_is_rejected() {
        let mut request = valid_request();
        request.amount_cents = 0;
        assert!(request.validate().is_err());
    }

    #[test]
    fn malformed_redirect_url_is_rejected() {
        let mut request = valid_request();
        request.redirect_url = "not-a-url".into();
        assert!(request.validate().is_err());
    }

    #[test]
    fn empty_idempotency_key_is_rejected() {
        let mut request = valid_request();
        request.idempotency_key = String::new();
        assert!(request.validate().is_err());
    }

    #[test]
    fn cancelled_payments_report_as_failed_on_the_wire() {
        assert_eq!(
            PaymentUrlStatus::from(PaymentStatus::Cancelled),
            PaymentUrlStatus::Failed
        );
        assert_eq!(
            PaymentUrlStatus::from(PaymentStatus::Pending),
            PaymentUrlStatus::Pending
        );
        assert_eq!(
            PaymentUrlStatus::from(PaymentStatus::Completed),
            PaymentUrlStatus::Completed
        );
        assert_eq!(
            PaymentUrlStatus::from(PaymentStatus::Failed),
            PaymentUrlStatus::Failed
        );
    }
}
