use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use paygate_engine::{traits::CartStoreError, OrderFlowError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Could not read request path: {0}")]
    InvalidRequestPath(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("The request did not identify a user")]
    MissingUserId,
    #[error("{0}")]
    OrderFlowError(#[from] OrderFlowError),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InvalidRequestPath(_) => StatusCode::BAD_REQUEST,
            Self::MissingUserId => StatusCode::UNAUTHORIZED,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::OrderFlowError(e) => match e {
                OrderFlowError::Validation(_) => StatusCode::BAD_REQUEST,
                OrderFlowError::Signature(_) => StatusCode::UNAUTHORIZED,
                OrderFlowError::SessionExpiredOrMissing(_) => StatusCode::GONE,
                OrderFlowError::CartMissingOrEmpty(_) => StatusCode::UNPROCESSABLE_ENTITY,
                OrderFlowError::ProviderTransient(_) => StatusCode::BAD_GATEWAY,
                OrderFlowError::ProviderRejected(_) => StatusCode::PAYMENT_REQUIRED,
                OrderFlowError::AmountMismatch { .. } => StatusCode::BAD_REQUEST,
                OrderFlowError::OrderNotFound(_) => StatusCode::NOT_FOUND,
                OrderFlowError::InvalidOrderState { .. } => StatusCode::CONFLICT,
                OrderFlowError::UnsupportedPaymentMethod(_) => StatusCode::BAD_REQUEST,
                OrderFlowError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<CartStoreError> for ServerError {
    fn from(e: CartStoreError) -> Self {
        Self::OrderFlowError(e.into())
    }
}

#[cfg(test)]
mod test {
    use actix_web::body::MessageBody;
    use paygate_engine::db_types::PaymentReference;

    use super::*;

    #[test]
    fn order_flow_errors_map_to_status_codes() {
        let reference = PaymentReference::from("ORD-1");
        let cases = [
            (OrderFlowError::Validation("bad".into()), 400),
            (OrderFlowError::Signature("mismatch".into()), 401),
            (OrderFlowError::SessionExpiredOrMissing(reference.clone()), 410),
            (OrderFlowError::CartMissingOrEmpty("alice".into()), 422),
            (OrderFlowError::ProviderTransient("timeout".into()), 502),
            (OrderFlowError::ProviderRejected("declined".into()), 402),
            (OrderFlowError::OrderNotFound(reference), 404),
            (OrderFlowError::DatabaseError("locked".into()), 500),
        ];
        for (e, status) in cases {
            assert_eq!(ServerError::from(e).status_code().as_u16(), status);
        }
    }

    #[test]
    fn errors_are_json() {
        let res = ServerError::MissingUserId.error_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
        let body = res.into_body().try_into_bytes().unwrap();
        assert_eq!(body, r#"{"error":"The request did not identify a user"}"#);
    }
}
