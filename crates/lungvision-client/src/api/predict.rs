//! Prediction API.

use serde_json::Value;

use crate::client::LungVisionClient;
use crate::error::{AuthError, AuthResult, Error};
use crate::normalize::{ErrorContext, normalize};
use crate::transport::{ApiRequest, MultipartForm};
use crate::types::{PredictionResponse, UploadFile};
use crate::validation::validate_archive;

const UPLOAD_FAILED: &str = "Upload failed. Please try again.";

/// Prediction API client.
pub struct PredictApi {
    client: LungVisionClient,
}

impl PredictApi {
    pub(crate) fn new(client: LungVisionClient) -> Self {
        Self { client }
    }

    /// Upload a zipped DICOM study for classification.
    ///
    /// The archive is checked locally first. Uploads use the client's
    /// upload timeout rather than the default request timeout.
    pub async fn upload(&self, archive: UploadFile) -> AuthResult<PredictionResponse> {
        validate_archive(&archive)?;

        let size = archive.len();
        let request = ApiRequest::post("predict/")
            .multipart(MultipartForm::new().file("file", archive))
            .timeout(self.client.upload_timeout());

        tracing::info!(bytes = size, "Uploading study archive");
        let response: PredictionResponse =
            self.client.send(&request).await.map_err(upload_error)?;
        tracing::info!(
            patient_id = %response.patient_id,
            predicted_class = %response.predicted_class,
            "Prediction received"
        );
        Ok(response)
    }
}

/// The server's `detail` when it sent one, else a generic retry hint.
fn upload_error(error: Error) -> AuthError {
    let detail = match &error {
        Error::Api { payload, .. } => payload
            .get("detail")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    };
    let mut normalized = normalize(error, ErrorContext::Session);
    normalized.message = detail.unwrap_or_else(|| UPLOAD_FAILED.to_string());
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AuthErrorKind;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> LungVisionClient {
        let client = LungVisionClient::builder()
            .base_url(format!("{}/api", server.uri()))
            .build()
            .unwrap();
        client.tokens().set("A1", "R1");
        client
    }

    fn archive() -> UploadFile {
        UploadFile::new("patient-001.zip", vec![0x50u8, 0x4b, 0x03, 0x04])
    }

    #[tokio::test]
    async fn test_upload_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/predict/"))
            .and(header("authorization", "Bearer A1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "patient_id": "patient-001",
                "predicted_class": "Benign",
                "predicted_class_index": 1,
                "confidence": 0.91,
                "class_probabilities": {"Benign": 0.91, "Malignant": 0.06, "Normal": 0.03},
                "prediction_visualization": null,
                "message": "Prediction completed",
                "processing_info": {"slices": 120}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let result = client(&server).predict().upload(archive()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.predicted_class, "Benign");
        assert_eq!(result.class_probabilities.len(), 3);
        assert!(result.prediction_visualization.is_none());

        let received = server.received_requests().await.unwrap();
        let body = String::from_utf8_lossy(&received[0].body);
        assert!(body.contains("name=\"file\""));
        assert!(body.contains("filename=\"patient-001.zip\""));
    }

    #[tokio::test]
    async fn test_rejects_non_zip_without_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/predict/"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let err = client(&server)
            .predict()
            .upload(UploadFile::new("scan.dcm", vec![1u8]))
            .await
            .unwrap_err();
        assert_eq!(err.kind, AuthErrorKind::InvalidInput);
        assert_eq!(err.message, "Please upload a .zip file containing DICOMs.");
    }

    #[tokio::test]
    async fn test_server_detail_is_surfaced() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/predict/"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"detail": "No DICOM files found in archive"})),
            )
            .mount(&server)
            .await;

        let err = client(&server).predict().upload(archive()).await.unwrap_err();
        assert_eq!(err.message, "No DICOM files found in archive");
        assert_eq!(err.status, Some(400));
    }

    #[tokio::test]
    async fn test_generic_failure_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/predict/"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .mount(&server)
            .await;

        let err = client(&server).predict().upload(archive()).await.unwrap_err();
        assert_eq!(err.kind, AuthErrorKind::Server);
        assert_eq!(err.message, UPLOAD_FAILED);
    }
}
