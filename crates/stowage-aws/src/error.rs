//! Mapping of AWS SDK errors into [`ClientError`].

use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
use stowage_core::ClientError;

/// Convert an SDK error of `operation` into a [`ClientError`].
///
/// Service responses keep their S3 error code. Responses without a code
/// (e.g. a bare `404` to a `HEAD`) get `NotFound` or the HTTP status. Any
/// other failure (construction, dispatch, timeout, unparseable response) is a
/// transport error carrying the full error chain.
pub(crate) fn map_sdk_error<E>(operation: &'static str, err: SdkError<E>) -> ClientError
where
    E: ProvideErrorMetadata + std::error::Error + Send + Sync + 'static,
{
    if let SdkError::ServiceError(ctx) = &err {
        let service = ctx.err();
        let status = ctx.raw().status().as_u16();
        let code = match service.code() {
            Some(code) => code.to_owned(),
            None if status == 404 => "NotFound".to_owned(),
            None => format!("Http{status}"),
        };
        let message = service
            .message()
            .map_or_else(|| DisplayErrorContext(service).to_string(), str::to_owned);
        return ClientError::service(operation, code, message);
    }
    ClientError::transport(operation, DisplayErrorContext(&err).to_string())
}

/// A response was accepted by the SDK but lacks a field the operation needs.
pub(crate) fn missing_field(operation: &'static str, field: &str) -> ClientError {
    ClientError::transport(operation, format!("response carried no {field}"))
}

#[cfg(test)]
mod tests {
    use aws_sdk_s3::operation::get_object::GetObjectError;

    use super::*;

    #[test]
    fn test_should_map_construction_failure_to_transport() {
        let err: SdkError<GetObjectError> = SdkError::construction_failure("bad endpoint");
        let mapped = map_sdk_error("GetObject", err);
        assert!(matches!(mapped, ClientError::Transport { operation: "GetObject", .. }));
        assert!(mapped.code().is_none());
    }

    #[test]
    fn test_should_describe_missing_fields() {
        let err = missing_field("UploadPart", "ETag");
        assert_eq!(err.to_string(), "UploadPart failed: response carried no ETag");
    }
}
