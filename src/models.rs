use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::threshold::percentage;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub role: Role,
    pub name: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subject {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub code: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentSummary {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
    pub student_id: String,
    pub email: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum AttendanceStatus {
    Present,
    Absent,
    Late,
    Excused,
}

impl AttendanceStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AttendanceStatus::Present => "Present",
            AttendanceStatus::Absent => "Absent",
            AttendanceStatus::Late => "Late",
            AttendanceStatus::Excused => "Excused",
        }
    }

    /// Late arrivals count towards attendance.
    pub fn is_attended(self) -> bool {
        matches!(self, AttendanceStatus::Present | AttendanceStatus::Late)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum ClassType {
    Theory,
    Practical,
}

impl ClassType {
    pub fn as_str(self) -> &'static str {
        match self {
            ClassType::Theory => "Theory",
            ClassType::Practical => "Practical",
        }
    }
}

/// A single attendance mark as recorded by the attendance service. Dates and
/// times arrive as `dd/mm/yyyy` and `HH:MM` strings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceRecord {
    #[serde(rename = "studentId")]
    pub student: StudentSummary,
    #[serde(rename = "subjectId")]
    pub subject: Subject,
    pub status: AttendanceStatus,
    #[serde(rename = "type")]
    pub class_type: ClassType,
    pub created_at_date: String,
    pub created_at_time: String,
}

impl AttendanceRecord {
    pub fn date(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(&self.created_at_date, "%d/%m/%Y").ok()
    }

    pub fn time(&self) -> Option<NaiveTime> {
        NaiveTime::parse_from_str(&self.created_at_time, "%H:%M").ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AttendanceCounts {
    pub present: u32,
    pub total: u32,
}

/// Per-subject attendance. The percentage is always derived from the counts;
/// an incoming `percentage` field is ignored on decode and rewritten on encode.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SubjectAttendanceStat {
    pub subject: Subject,
    pub total: u32,
    pub present: u32,
}

impl SubjectAttendanceStat {
    pub fn new(subject: Subject, counts: AttendanceCounts) -> Self {
        Self {
            subject,
            total: counts.total,
            present: counts.present,
        }
    }

    pub fn percentage(&self) -> f64 {
        percentage(self.present, self.total)
    }
}

#[derive(Serialize)]
struct SubjectStatWire<'a> {
    subject: &'a Subject,
    total: u32,
    present: u32,
    percentage: f64,
}

impl Serialize for SubjectAttendanceStat {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        SubjectStatWire {
            subject: &self.subject,
            total: self.total,
            present: self.present,
            percentage: self.percentage(),
        }
        .serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Defaulter {
    pub student: StudentSummary,
    pub defaulter_subjects: Vec<SubjectAttendanceStat>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum GrievanceStatus {
    Pending,
    #[serde(rename = "Under Review")]
    UnderReview,
    Resolved,
    Rejected,
}

impl std::fmt::Display for GrievanceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            GrievanceStatus::Pending => "Pending",
            GrievanceStatus::UnderReview => "Under Review",
            GrievanceStatus::Resolved => "Resolved",
            GrievanceStatus::Rejected => "Rejected",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Grievance {
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "subjectId")]
    pub subject: Subject,
    pub title: String,
    pub description: String,
    #[serde(default)]
    pub attachments: Vec<String>,
    pub status: GrievanceStatus,
    #[serde(default)]
    pub response: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverviewTotals {
    pub total_students: u64,
    pub total_teachers: u64,
    pub total_departments: u64,
    pub total_subjects: u64,
    pub current_attendance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentStat {
    pub name: String,
    pub student_count: u64,
    pub semester_count: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyTrendPoint {
    pub date: String,
    pub attendance_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyticsOverview {
    pub overview: OverviewTotals,
    #[serde(default)]
    pub department_stats: Vec<DepartmentStat>,
    #[serde(default)]
    pub weekly_trend: Vec<WeeklyTrendPoint>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSettings {
    pub attendance_threshold: f64,
    pub defaulter_alert_threshold: f64,
    pub auto_notify_defaulters: bool,
    pub allow_grievance_submission: bool,
    pub max_grievance_attachments: u32,
    /// Megabytes.
    pub csv_upload_max_size: u32,
    /// Hours.
    pub session_timeout: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct ReportStats {
    pub total: u32,
    pub present: u32,
    #[serde(default)]
    pub absent: u32,
    #[serde(default)]
    pub late: u32,
    #[serde(default)]
    pub excused: u32,
}

impl ReportStats {
    pub fn percentage(&self) -> f64 {
        percentage(self.present + self.late, self.total)
    }
}

/// Per-subject attendance for a teacher's classes.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AttendanceReport {
    pub subject: Subject,
    #[serde(default)]
    pub records: Vec<AttendanceRecord>,
    pub stats: ReportStats,
}

/// A teacher's assignment to a subject, with the students enrolled in it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Allocation {
    #[serde(rename = "subjectId")]
    pub subject: Subject,
    #[serde(default)]
    pub students: Vec<StudentSummary>,
    #[serde(rename = "type")]
    pub class_type: ClassType,
    #[serde(default)]
    pub division: String,
    #[serde(default)]
    pub batch: String,
    #[serde(default)]
    pub total_planned: u32,
    #[serde(default)]
    pub total_conducted: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalyticsSubject {
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub department: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubjectAnalytics {
    pub subject: AnalyticsSubject,
    pub total_classes: u64,
    pub average_attendance: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnalyticsTeacher {
    pub name: String,
    #[serde(default)]
    pub department: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeacherAnalytics {
    pub teacher: AnalyticsTeacher,
    pub classes_recorded: u64,
    pub subjects_handled: u64,
}

/// Row of the admin user listing. Teachers and students come back with
/// different field names for the same things.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserEntry {
    #[serde(rename = "_id")]
    pub id: String,
    pub role: Role,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub teacher_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub teacher_email: Option<String>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub department: Option<String>,
    #[serde(default)]
    pub department_id: Option<serde_json::Value>,
}

impl UserEntry {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .or(self.teacher_name.as_deref())
            .unwrap_or("Unknown")
    }

    pub fn display_email(&self) -> &str {
        self.email
            .as_deref()
            .or(self.teacher_email.as_deref())
            .unwrap_or("No email")
    }

    /// Accounts without an explicit flag are active.
    pub fn is_active(&self) -> bool {
        self.is_active != Some(false)
    }

    pub fn department_name(&self) -> Option<&str> {
        self.department.as_deref().or_else(|| {
            self.department_id
                .as_ref()
                .and_then(|department| department.get("name"))
                .and_then(|name| name.as_str())
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub current: u32,
    pub total: u32,
    pub count: u32,
    pub total_records: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct UserPage {
    pub users: Vec<UserEntry>,
    #[serde(default)]
    pub pagination: Pagination,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Department {
    #[serde(rename = "_id")]
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Semester {
    #[serde(rename = "_id")]
    pub id: String,
    pub semester_number: u32,
    pub academic_year: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum Gender {
    Male,
    Female,
    Other,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTeacher {
    pub teacher_name: String,
    pub teacher_email: String,
    pub teacher_password: String,
    pub teacher_gender: Gender,
    pub teacher_number: String,
    /// Department name; teachers are not linked by id.
    pub department: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewStudent {
    pub name: String,
    pub student_id: String,
    pub email: String,
    pub password: String,
    pub division: String,
    pub batch: String,
    pub contact_number: String,
    pub gender: Gender,
    pub department_id: String,
    pub semester_id: String,
}

/// One entry of a bulk attendance submission.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttendanceMark {
    pub student_id: String,
    pub subject_id: String,
    pub status: AttendanceStatus,
    #[serde(rename = "type")]
    pub class_type: ClassType,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSummary {
    pub records_created: u64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentAttendance {
    #[serde(default)]
    pub attendance: Vec<AttendanceRecord>,
    #[serde(default)]
    pub subject_stats: Vec<SubjectAttendanceStat>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stat_percentage_is_rewritten_from_counts() {
        let stat: SubjectAttendanceStat = serde_json::from_str(
            r#"{"subject":{"_id":"s1","name":"Maths","code":"MATH101"},"total":40,"present":30,"percentage":12.0}"#,
        )
        .unwrap();
        assert_eq!(stat.percentage(), 75.0);

        let encoded = serde_json::to_value(&stat).unwrap();
        assert_eq!(encoded["percentage"], 75.0);
        assert_eq!(encoded["subject"]["_id"], "s1");
    }

    #[test]
    fn decodes_attendance_record_dates() {
        let record: AttendanceRecord = serde_json::from_str(
            r#"{
                "_id": "a1",
                "studentId": {"_id": "u1", "name": "Avery Lee", "studentId": "S-01", "email": "avery@example.com"},
                "subjectId": {"_id": "s1", "name": "Maths", "code": "MATH101"},
                "status": "Late",
                "type": "Practical",
                "createdAtDate": "03/02/2026",
                "createdAtTime": "09:15"
            }"#,
        )
        .unwrap();
        assert_eq!(record.status, AttendanceStatus::Late);
        assert_eq!(record.class_type, ClassType::Practical);
        assert_eq!(record.date(), NaiveDate::from_ymd_opt(2026, 2, 3));
        assert_eq!(record.time(), NaiveTime::from_hms_opt(9, 15, 0));
    }

    #[test]
    fn report_stats_count_late_as_attended() {
        let stats: ReportStats =
            serde_json::from_str(r#"{"total":20,"present":12,"absent":4,"late":3,"excused":1}"#)
                .unwrap();
        assert_eq!(stats.percentage(), 75.0);
        assert_eq!(ReportStats::default().percentage(), 0.0);
    }

    #[test]
    fn user_entries_read_teacher_and_student_shapes() {
        let page: UserPage = serde_json::from_str(
            r#"{
                "users": [
                    {"_id": "t1", "role": "teacher", "teacherName": "R. Iyer",
                     "teacherEmail": "iyer@example.com", "department": "Physics"},
                    {"_id": "s1", "role": "student", "name": "Avery Lee", "email": "avery@example.com",
                     "isActive": false, "departmentId": {"_id": "d1", "name": "Computing"}}
                ],
                "pagination": {"current": 1, "total": 3, "count": 2, "totalRecords": 22}
            }"#,
        )
        .unwrap();

        assert_eq!(page.users[0].display_name(), "R. Iyer");
        assert_eq!(page.users[0].display_email(), "iyer@example.com");
        assert!(page.users[0].is_active());
        assert_eq!(page.users[0].department_name(), Some("Physics"));
        assert!(!page.users[1].is_active());
        assert_eq!(page.users[1].department_name(), Some("Computing"));
        assert_eq!(page.pagination.total_records, 22);
    }

    #[test]
    fn new_student_body_uses_api_field_names() {
        let body = serde_json::to_value(NewStudent {
            name: "Avery Lee".to_string(),
            student_id: "S-01".to_string(),
            email: "avery@example.com".to_string(),
            password: "secret".to_string(),
            division: "A".to_string(),
            batch: "A1".to_string(),
            contact_number: "5550100".to_string(),
            gender: Gender::Female,
            department_id: "d1".to_string(),
            semester_id: "sem1".to_string(),
        })
        .unwrap();
        assert_eq!(body["studentId"], "S-01");
        assert_eq!(body["contactNumber"], "5550100");
        assert_eq!(body["gender"], "Female");
        assert_eq!(body["semesterId"], "sem1");
    }

    #[test]
    fn attendance_marks_encode_for_bulk_submission() {
        let body = serde_json::to_value(AttendanceMark {
            student_id: "u1".to_string(),
            subject_id: "s1".to_string(),
            status: AttendanceStatus::Late,
            class_type: ClassType::Practical,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "studentId": "u1",
                "subjectId": "s1",
                "status": "Late",
                "type": "Practical"
            })
        );
    }

    #[test]
    fn grievance_status_uses_display_labels() {
        let status: GrievanceStatus = serde_json::from_str("\"Under Review\"").unwrap();
        assert_eq!(status, GrievanceStatus::UnderReview);
        assert_eq!(status.to_string(), "Under Review");
    }
}
