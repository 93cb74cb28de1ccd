use std::collections::{HashMap, HashSet};
use std::io::Write;

use crate::defaulters::AttendanceBySubject;
use crate::models::{
    Allocation, AttendanceCounts, AttendanceReport, Defaulter, StudentSummary,
    SubjectAttendanceStat,
};
use crate::threshold::{Thresholds, Tier};

#[derive(Debug, Clone, PartialEq)]
pub struct TierSummary {
    pub tier: Tier,
    pub count: usize,
    pub avg_percentage: f64,
}

/// Counts subject stats per tier, most populated tier first.
pub fn summarize_by_tier(
    stats: &[SubjectAttendanceStat],
    thresholds: &Thresholds,
) -> Vec<TierSummary> {
    let mut map: HashMap<Tier, (usize, f64)> = HashMap::new();

    for stat in stats {
        let entry = map.entry(thresholds.classify(stat.percentage())).or_insert((0, 0.0));
        entry.0 += 1;
        entry.1 += stat.percentage();
    }

    let mut summaries: Vec<TierSummary> = map
        .into_iter()
        .map(|(tier, (count, total))| TierSummary {
            tier,
            count,
            avg_percentage: if count == 0 { 0.0 } else { total / count as f64 },
        })
        .collect();

    summaries.sort_by(|a, b| b.count.cmp(&a.count).then(a.tier.label().cmp(b.tier.label())));
    summaries
}

pub fn export_file_name(threshold: f64) -> String {
    format!("defaulters_report_{threshold}percent.csv")
}

/// One allocation per subject, first one wins.
pub fn unique_subjects(allocations: &[Allocation]) -> Vec<&Allocation> {
    let mut seen = HashSet::new();
    allocations
        .iter()
        .filter(|allocation| seen.insert(allocation.subject.id.as_str()))
        .collect()
}

/// Students across all allocations in allocation order, each listed once.
pub fn allocation_roster(allocations: &[Allocation]) -> Vec<StudentSummary> {
    let mut seen = HashSet::new();
    allocations
        .iter()
        .flat_map(|allocation| allocation.students.iter())
        .filter(|student| seen.insert(student.id.clone()))
        .cloned()
        .collect()
}

/// Per-student subject stats counted from report records. Late marks count as
/// attended; every record counts towards the total.
pub fn tally_reports(reports: &[AttendanceReport]) -> AttendanceBySubject {
    let mut by_student = AttendanceBySubject::new();
    for report in reports {
        let mut counts: HashMap<&str, AttendanceCounts> = HashMap::new();
        for record in &report.records {
            let entry = counts.entry(record.student.id.as_str()).or_default();
            entry.total += 1;
            if record.status.is_attended() {
                entry.present += 1;
            }
        }
        for (student_id, counts) in counts {
            by_student
                .entry(student_id.to_string())
                .or_default()
                .push(SubjectAttendanceStat::new(report.subject.clone(), counts));
        }
    }
    by_student
}

pub fn report_file_name(subject_code: &str) -> String {
    format!("{subject_code}_attendance_report.csv")
}

/// Writes the raw records of one subject report.
pub fn write_report_csv<W: Write>(writer: W, report: &AttendanceReport) -> anyhow::Result<usize> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record(["Student Name", "Student ID", "Status", "Type", "Date", "Time"])?;
    for record in &report.records {
        csv.write_record([
            record.student.name.as_str(),
            record.student.student_id.as_str(),
            record.status.as_str(),
            record.class_type.as_str(),
            record.created_at_date.as_str(),
            record.created_at_time.as_str(),
        ])?;
    }
    csv.flush()?;
    Ok(report.records.len())
}

/// Writes one CSV row per defaulting subject.
pub fn write_defaulters_csv<W: Write>(
    writer: W,
    defaulters: &[Defaulter],
) -> anyhow::Result<usize> {
    let mut csv = csv::Writer::from_writer(writer);
    csv.write_record([
        "Student Name",
        "Student ID",
        "Email",
        "Subject",
        "Subject Code",
        "Attendance %",
        "Total Classes",
        "Present Classes",
    ])?;

    let mut rows = 0usize;
    for defaulter in defaulters {
        for stat in &defaulter.defaulter_subjects {
            let percentage = format!("{:.1}", stat.percentage());
            let total = stat.total.to_string();
            let present = stat.present.to_string();
            csv.write_record([
                defaulter.student.name.as_str(),
                defaulter.student.student_id.as_str(),
                defaulter.student.email.as_str(),
                stat.subject.name.as_str(),
                stat.subject.code.as_str(),
                percentage.as_str(),
                total.as_str(),
                present.as_str(),
            ])?;
            rows += 1;
        }
    }
    csv.flush()?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defaulters::find_defaulters;
    use crate::models::{
        AttendanceRecord, AttendanceStatus, ClassType, ReportStats, StudentSummary, Subject,
    };

    fn stat(code: &str, present: u32, total: u32) -> SubjectAttendanceStat {
        SubjectAttendanceStat::new(
            Subject {
                id: code.to_lowercase(),
                name: format!("{code} name"),
                code: code.to_string(),
            },
            AttendanceCounts { present, total },
        )
    }

    #[test]
    fn csv_has_one_row_per_defaulting_subject() {
        let defaulters = vec![Defaulter {
            student: StudentSummary {
                id: "u2".to_string(),
                name: "Patel, Kiara".to_string(),
                student_id: "S-02".to_string(),
                email: "kiara@example.com".to_string(),
            },
            defaulter_subjects: vec![stat("MATH101", 20, 30), stat("PHY101", 0, 0)],
        }];

        let mut out = Vec::new();
        let rows = write_defaulters_csv(&mut out, &defaulters).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(rows, 2);
        assert_eq!(
            lines[0],
            "Student Name,Student ID,Email,Subject,Subject Code,Attendance %,Total Classes,Present Classes"
        );
        assert_eq!(
            lines[1],
            "\"Patel, Kiara\",S-02,kiara@example.com,MATH101 name,MATH101,66.7,30,20"
        );
        assert_eq!(
            lines[2],
            "\"Patel, Kiara\",S-02,kiara@example.com,PHY101 name,PHY101,0.0,0,0"
        );
    }

    #[test]
    fn summaries_group_by_tier() {
        let stats = vec![
            stat("A", 38, 40),
            stat("B", 27, 40),
            stat("C", 10, 40),
            stat("D", 0, 0),
        ];
        let summaries = summarize_by_tier(&stats, &Thresholds::default());

        assert_eq!(summaries[0].tier, Tier::Defaulter);
        assert_eq!(summaries[0].count, 2);
        assert!((summaries[0].avg_percentage - 12.5).abs() < 0.001);
        assert_eq!(summaries.len(), 3);
    }

    fn student(id: &str) -> StudentSummary {
        StudentSummary {
            id: id.to_string(),
            name: format!("Student {id}"),
            student_id: format!("S-{id}"),
            email: format!("{id}@example.com"),
        }
    }

    fn subject(code: &str) -> Subject {
        Subject {
            id: code.to_lowercase(),
            name: format!("{code} name"),
            code: code.to_string(),
        }
    }

    fn record(student_id: &str, code: &str, status: AttendanceStatus) -> AttendanceRecord {
        AttendanceRecord {
            student: student(student_id),
            subject: subject(code),
            status,
            class_type: ClassType::Theory,
            created_at_date: "03/02/2026".to_string(),
            created_at_time: "09:15".to_string(),
        }
    }

    fn allocation(code: &str, students: &[&str]) -> Allocation {
        Allocation {
            subject: subject(code),
            students: students.iter().map(|id| student(id)).collect(),
            class_type: ClassType::Theory,
            division: "A".to_string(),
            batch: String::new(),
            total_planned: 40,
            total_conducted: 4,
        }
    }

    #[test]
    fn report_tallies_feed_roster_defaulters() {
        use AttendanceStatus::*;
        let allocations = vec![
            allocation("MATH101", &["3", "1"]),
            allocation("MATH101", &["1", "2"]),
        ];
        let reports = vec![AttendanceReport {
            subject: subject("MATH101"),
            records: vec![
                record("1", "MATH101", Present),
                record("1", "MATH101", Late),
                record("1", "MATH101", Present),
                record("1", "MATH101", Excused),
                record("2", "MATH101", Absent),
                record("2", "MATH101", Present),
                record("3", "MATH101", Absent),
                record("3", "MATH101", Absent),
            ],
            stats: ReportStats::default(),
        }];

        let roster = allocation_roster(&allocations);
        let ids: Vec<&str> = roster.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "1", "2"]);
        assert_eq!(unique_subjects(&allocations).len(), 1);

        let attendance = tally_reports(&reports);
        assert_eq!(attendance["1"][0].percentage(), 75.0);

        let defaulters = find_defaulters(&roster, &attendance, 75.0);
        let ids: Vec<&str> = defaulters.iter().map(|d| d.student.id.as_str()).collect();
        assert_eq!(ids, vec!["3", "2"]);
        assert_eq!(defaulters[1].defaulter_subjects[0].percentage(), 50.0);
    }

    #[test]
    fn subject_report_csv_lists_records() {
        let report = AttendanceReport {
            subject: subject("PHY101"),
            records: vec![record("1", "PHY101", AttendanceStatus::Late)],
            stats: ReportStats::default(),
        };
        let mut out = Vec::new();
        assert_eq!(write_report_csv(&mut out, &report).unwrap(), 1);
        let text = String::from_utf8(out).unwrap();
        assert_eq!(
            text,
            "Student Name,Student ID,Status,Type,Date,Time\n\
             Student 1,S-1,Late,Theory,03/02/2026,09:15\n"
        );
        assert_eq!(report_file_name("PHY101"), "PHY101_attendance_report.csv");
    }

    #[test]
    fn export_name_includes_threshold() {
        assert_eq!(export_file_name(75.0), "defaulters_report_75percent.csv");
    }
}
