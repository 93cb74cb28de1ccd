use std::path::Path;

use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tracing::warn;

use crate::models::{
    Allocation, AnalyticsOverview, AttendanceMark, AttendanceReport, ClassType, Defaulter,
    Department, Grievance, GrievanceStatus, NewStudent, NewTeacher, Role, Semester,
    StudentAttendance, SubjectAnalytics, SystemSettings, TeacherAnalytics, UploadSummary, User,
    UserPage,
};
use crate::validation::GrievanceDraft;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    #[error("{message} (HTTP {status})")]
    Http { status: StatusCode, message: String },
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl ApiError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Http { status, .. } if *status == StatusCode::UNAUTHORIZED)
    }
}

/// Picks the user-facing message out of an error response body. A body that
/// is not JSON reads as a network error; JSON without a message falls back to
/// the status code.
pub fn error_message(status: StatusCode, body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: Option<String>,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody {
            message: Some(message),
        }) if !message.is_empty() => message,
        Ok(_) => format!("HTTP error! status: {}", status.as_u16()),
        Err(_) => "Network error".to_string(),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthResponse {
    pub user: User,
    /// Bearer credential for the push channel, when the server issues one.
    #[serde(default)]
    pub token: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrievanceFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<GrievanceStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_date: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UserFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Role>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u32>,
}

/// REST client for the attendance service. Session cookies set by login are
/// kept for later calls.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: Client,
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ApiError> {
        let http = Client::builder().cookie_store(true).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(status, &body);
            warn!(%status, %message, "attendance API request failed");
            return Err(ApiError::Http { status, message });
        }
        Ok(response.json().await?)
    }

    pub async fn login(&self, credentials: &Credentials) -> Result<AuthResponse, ApiError> {
        self.send(self.http.post(self.url("/auth/login")).json(credentials))
            .await
    }

    pub async fn verify(&self) -> Result<AuthResponse, ApiError> {
        self.send(self.http.get(self.url("/auth/verify"))).await
    }

    pub async fn logout(&self) -> Result<(), ApiError> {
        let _: serde_json::Value = self.send(self.http.post(self.url("/auth/logout"))).await?;
        Ok(())
    }

    pub async fn defaulters(&self, threshold: f64) -> Result<Vec<Defaulter>, ApiError> {
        self.send(
            self.http
                .get(self.url("/attendance/defaulters"))
                .query(&[("threshold", threshold)]),
        )
        .await
    }

    pub async fn student_attendance(
        &self,
        student_id: &str,
    ) -> Result<StudentAttendance, ApiError> {
        self.send(
            self.http
                .get(self.url(&format!("/attendance/student/{student_id}"))),
        )
        .await
    }

    pub async fn analytics_overview(&self) -> Result<AnalyticsOverview, ApiError> {
        self.send(self.http.get(self.url("/analytics/overview")))
            .await
    }

    pub async fn subject_analytics(&self) -> Result<Vec<SubjectAnalytics>, ApiError> {
        self.send(self.http.get(self.url("/analytics/subjects")))
            .await
    }

    pub async fn teacher_analytics(&self) -> Result<Vec<TeacherAnalytics>, ApiError> {
        self.send(self.http.get(self.url("/analytics/teachers")))
            .await
    }

    /// Records a batch of marks in one request. Returns the number sent.
    pub async fn mark_attendance(&self, records: &[AttendanceMark]) -> Result<usize, ApiError> {
        let _: serde_json::Value = self
            .send(
                self.http
                    .post(self.url("/attendance/mark"))
                    .json(&json!({ "attendanceRecords": records })),
            )
            .await?;
        Ok(records.len())
    }

    pub async fn teacher_allocations(&self) -> Result<Vec<Allocation>, ApiError> {
        self.send(self.http.get(self.url("/teacher/allocations")))
            .await
    }

    pub async fn attendance_reports(
        &self,
        filter: &ReportFilter,
    ) -> Result<Vec<AttendanceReport>, ApiError> {
        self.send(
            self.http
                .get(self.url("/teacher/attendance-reports"))
                .query(filter),
        )
        .await
    }

    pub async fn upload_attendance_csv(
        &self,
        path: &Path,
        subject_id: &str,
        class_type: ClassType,
    ) -> Result<UploadSummary, ApiError> {
        let form = Form::new()
            .part("csvFile", file_part(path).await?)
            .text("subjectId", subject_id.to_string())
            .text("type", class_type.as_str());
        self.send(
            self.http
                .post(self.url("/attendance/upload-csv"))
                .multipart(form),
        )
        .await
    }

    pub async fn submit_grievance(&self, draft: &GrievanceDraft) -> Result<Grievance, ApiError> {
        let mut form = Form::new()
            .text("subjectId", draft.subject_id.clone())
            .text("title", draft.title.clone())
            .text("description", draft.description.clone());
        for attachment in &draft.attachments {
            form = form.part("attachments", file_part(&attachment.path).await?);
        }
        self.send(self.http.post(self.url("/grievances/submit")).multipart(form))
            .await
    }

    pub async fn my_grievances(&self) -> Result<Vec<Grievance>, ApiError> {
        self.send(self.http.get(self.url("/grievances/my"))).await
    }

    pub async fn all_grievances(
        &self,
        filter: &GrievanceFilter,
    ) -> Result<Vec<Grievance>, ApiError> {
        self.send(self.http.get(self.url("/grievances/all")).query(filter))
            .await
    }

    pub async fn update_grievance_status(
        &self,
        grievance_id: &str,
        status: GrievanceStatus,
        response: Option<&str>,
    ) -> Result<Grievance, ApiError> {
        let mut body = json!({ "status": status });
        if let Some(response) = response {
            body["response"] = json!(response);
        }
        self.send(
            self.http
                .put(self.url(&format!("/grievances/{grievance_id}/status")))
                .json(&body),
        )
        .await
    }

    pub async fn toggle_user_status(&self, user_id: &str, role: Role) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .send(
                self.http
                    .put(self.url(&format!("/admin/users/{user_id}/toggle-status")))
                    .json(&json!({ "role": role })),
            )
            .await?;
        Ok(())
    }

    pub async fn users(&self, filter: &UserFilter) -> Result<UserPage, ApiError> {
        self.send(self.http.get(self.url("/admin/users")).query(filter))
            .await
    }

    pub async fn create_teacher(&self, teacher: &NewTeacher) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .send(self.http.post(self.url("/admin/teachers")).json(teacher))
            .await?;
        Ok(())
    }

    pub async fn create_student(&self, student: &NewStudent) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .send(self.http.post(self.url("/admin/students")).json(student))
            .await?;
        Ok(())
    }

    pub async fn departments(&self) -> Result<Vec<Department>, ApiError> {
        self.send(self.http.get(self.url("/admin/departments")))
            .await
    }

    pub async fn semesters(&self, department_id: &str) -> Result<Vec<Semester>, ApiError> {
        self.send(
            self.http
                .get(self.url(&format!("/admin/departments/{department_id}/semesters"))),
        )
        .await
    }

    pub async fn system_settings(&self) -> Result<SystemSettings, ApiError> {
        self.send(self.http.get(self.url("/admin/settings"))).await
    }

    pub async fn update_system_settings(&self, settings: &SystemSettings) -> Result<(), ApiError> {
        let _: serde_json::Value = self
            .send(self.http.put(self.url("/admin/settings")).json(settings))
            .await?;
        Ok(())
    }
}

async fn file_part(path: &Path) -> Result<Part, ApiError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| ApiError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "upload".to_string());
    Ok(Part::bytes(bytes).file_name(name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_prefers_server_message() {
        assert_eq!(
            error_message(StatusCode::UNAUTHORIZED, r#"{"message":"Invalid credentials"}"#),
            "Invalid credentials"
        );
    }

    #[test]
    fn error_message_reports_network_error_for_non_json_bodies() {
        assert_eq!(
            error_message(StatusCode::BAD_GATEWAY, "<html>502</html>"),
            "Network error"
        );
        assert_eq!(error_message(StatusCode::BAD_GATEWAY, ""), "Network error");
    }

    #[test]
    fn error_message_falls_back_to_status_for_json_without_message() {
        assert_eq!(
            error_message(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"boom"}"#),
            "HTTP error! status: 500"
        );
        assert_eq!(
            error_message(StatusCode::NOT_FOUND, r#"{"message":""}"#),
            "HTTP error! status: 404"
        );
    }

    #[test]
    fn list_filters_omit_unset_fields() {
        let filter = UserFilter {
            role: Some(Role::Teacher),
            page: Some(2),
            ..UserFilter::default()
        };
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({ "role": "teacher", "page": 2 })
        );
        let filter = ReportFilter {
            start_date: Some("2026-01-01".to_string()),
            ..ReportFilter::default()
        };
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({ "startDate": "2026-01-01" })
        );
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = ApiClient::new("http://localhost:5000/api/").unwrap();
        assert_eq!(
            client.url("/attendance/defaulters"),
            "http://localhost:5000/api/attendance/defaulters"
        );
    }

    #[test]
    fn grievance_filter_omits_empty_fields() {
        let filter = GrievanceFilter {
            status: Some(GrievanceStatus::UnderReview),
            subject_id: None,
        };
        assert_eq!(
            serde_json::to_value(&filter).unwrap(),
            json!({ "status": "Under Review" })
        );
    }

    #[test]
    fn login_body_uses_lowercase_role() {
        let credentials = Credentials {
            email: "admin123".to_string(),
            password: "password".to_string(),
            role: Role::Admin,
        };
        assert_eq!(
            serde_json::to_value(&credentials).unwrap()["role"],
            "admin"
        );
    }
}
