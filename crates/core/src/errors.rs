use thiserror::Error;

use crate::engine::WorkflowError;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("invalid submission: {0}")]
    InvalidSubmission(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

impl ApplicationError {
    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        let mut mapped = InterfaceError::from(self);
        match &mut mapped {
            InterfaceError::BadRequest { correlation_id: id, .. }
            | InterfaceError::ServiceUnavailable { correlation_id: id, .. }
            | InterfaceError::Internal { correlation_id: id, .. } => *id = correlation_id,
        }
        mapped
    }
}

impl From<WorkflowError> for ApplicationError {
    fn from(value: WorkflowError) -> Self {
        match value {
            WorkflowError::Store(error) => Self::Persistence(error.to_string()),
            WorkflowError::Counter(error) => Self::Persistence(error.to_string()),
            WorkflowError::InvalidSubmission(message) => {
                Self::Domain(DomainError::InvalidSubmission(message))
            }
        }
    }
}

impl From<ApplicationError> for InterfaceError {
    fn from(value: ApplicationError) -> Self {
        match value {
            ApplicationError::Domain(DomainError::InvalidSubmission(message)) => {
                Self::BadRequest { message, correlation_id: "unassigned".to_owned() }
            }
            ApplicationError::Persistence(message) => {
                Self::ServiceUnavailable { message, correlation_id: "unassigned".to_owned() }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::counter::CounterError;
    use crate::engine::WorkflowError;
    use crate::errors::{ApplicationError, DomainError, InterfaceError};
    use crate::store::StoreError;

    #[test]
    fn invalid_submission_is_a_domain_error_and_a_bad_request() {
        let error = WorkflowError::InvalidSubmission("response id is required".into());
        let application = ApplicationError::from(error);
        assert_eq!(
            application,
            ApplicationError::Domain(DomainError::InvalidSubmission(
                "response id is required".to_owned()
            ))
        );

        let interface = application.into_interface("req-1");
        assert!(matches!(
            interface,
            InterfaceError::BadRequest {
                ref correlation_id,
                ..
            } if correlation_id == "req-1"
        ));
        assert_eq!(
            interface.user_message(),
            "The request could not be processed. Check inputs and try again."
        );
    }

    #[test]
    fn counter_outage_maps_to_service_unavailable() {
        let interface = ApplicationError::from(WorkflowError::Counter(CounterError::Unavailable(
            "sequence table locked".to_owned(),
        )))
        .into_interface("req-2");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.correlation_id(), "req-2");
    }

    #[test]
    fn storage_outage_maps_to_service_unavailable() {
        let interface = ApplicationError::from(WorkflowError::Store(StoreError::Unavailable(
            "database is locked".to_owned(),
        )))
        .into_interface("req-3");

        assert!(matches!(interface, InterfaceError::ServiceUnavailable { .. }));
        assert_eq!(interface.correlation_id(), "req-3");
        assert_eq!(
            interface.user_message(),
            "The service is temporarily unavailable. Please retry shortly."
        );
    }

    #[test]
    fn invalid_submission_keeps_its_message() {
        let interface =
            ApplicationError::from(WorkflowError::InvalidSubmission("response id is required".into()))
                .into_interface("req-5");

        assert_eq!(
            interface,
            InterfaceError::BadRequest {
                message: "response id is required".to_owned(),
                correlation_id: "req-5".to_owned(),
            }
        );
    }
}
