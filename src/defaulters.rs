use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use crate::fetch::{FetchTicket, Generations, Query};
use crate::models::{Defaulter, StudentSummary, SubjectAttendanceStat};
use crate::push::DefaulterNotification;
use crate::threshold::{Threshold, ThresholdError};

/// Per-student subject stats keyed by the student's record id, as computed by
/// the attendance service.
pub type AttendanceBySubject = HashMap<String, Vec<SubjectAttendanceStat>>;

/// Students with at least one subject below `threshold`, in roster order.
///
/// A subject with no classes held counts as 0% and is therefore below any
/// positive threshold, so newly enrolled students show up here.
pub fn find_defaulters(
    roster: &[StudentSummary],
    attendance: &AttendanceBySubject,
    threshold: f64,
) -> Vec<Defaulter> {
    roster
        .iter()
        .filter_map(|student| {
            let stats = attendance.get(&student.id)?;
            let below: Vec<SubjectAttendanceStat> = stats
                .iter()
                .filter(|stat| stat.percentage() < threshold)
                .cloned()
                .collect();
            if below.is_empty() {
                None
            } else {
                Some(Defaulter {
                    student: student.clone(),
                    defaulter_subjects: below,
                })
            }
        })
        .collect()
}

/// Drops subject entries that are not below `threshold`, then drops students
/// left with none.
pub fn retain_below(defaulters: Vec<Defaulter>, threshold: f64) -> Vec<Defaulter> {
    defaulters
        .into_iter()
        .filter_map(|mut defaulter| {
            defaulter
                .defaulter_subjects
                .retain(|stat| stat.percentage() < threshold);
            (!defaulter.defaulter_subjects.is_empty()).then_some(defaulter)
        })
        .collect()
}

/// Case-insensitive match on name, student id or email.
pub fn matches_search(student: &StudentSummary, term: &str) -> bool {
    let term = term.to_lowercase();
    student.name.to_lowercase().contains(&term)
        || student.student_id.to_lowercase().contains(&term)
        || student.email.to_lowercase().contains(&term)
}

/// Working state of the defaulter list: active threshold, the last accepted
/// server list and the students picked for notification.
#[derive(Debug, Default)]
pub struct DefaulterBoard {
    threshold: Threshold,
    defaulters: Vec<Defaulter>,
    selected: BTreeSet<String>,
    generations: Generations,
}

impl DefaulterBoard {
    pub fn new(threshold: Threshold) -> Self {
        Self {
            threshold,
            ..Self::default()
        }
    }

    pub fn threshold(&self) -> Threshold {
        self.threshold
    }

    /// Changes the cut-off. Any refresh still in flight was fetched for the
    /// old value and becomes stale.
    pub fn set_threshold(&mut self, value: f64) -> Result<Threshold, ThresholdError> {
        self.threshold = Threshold::new(value)?;
        self.generations.issue(Query::Defaulters);
        Ok(self.threshold)
    }

    pub fn begin_refresh(&mut self) -> FetchTicket {
        self.generations.issue(Query::Defaulters)
    }

    /// Accepts a fetched list unless a newer refresh has been issued since.
    /// Returns whether the list was applied.
    pub fn apply(&mut self, ticket: FetchTicket, defaulters: Vec<Defaulter>) -> bool {
        if !self.generations.is_current(&ticket) {
            debug!(query = ?ticket.query(), "discarding stale defaulter list");
            return false;
        }
        self.defaulters = retain_below(defaulters, self.threshold.value());
        let known: BTreeSet<&str> = self
            .defaulters
            .iter()
            .map(|d| d.student.id.as_str())
            .collect();
        self.selected.retain(|id| known.contains(id.as_str()));
        true
    }

    pub fn defaulters(&self) -> &[Defaulter] {
        &self.defaulters
    }

    pub fn search(&self, term: &str) -> Vec<&Defaulter> {
        self.defaulters
            .iter()
            .filter(|d| matches_search(&d.student, term))
            .collect()
    }

    pub fn toggle_selection(&mut self, student_id: &str) {
        if !self.selected.remove(student_id) {
            self.selected.insert(student_id.to_string());
        }
    }

    /// Selects every student matching `term`, or clears the selection when
    /// all of them are already selected.
    pub fn toggle_select_all(&mut self, term: &str) {
        let visible: BTreeSet<String> = self
            .search(term)
            .into_iter()
            .map(|d| d.student.id.clone())
            .collect();
        if !visible.is_empty() && visible == self.selected {
            self.selected.clear();
        } else {
            self.selected = visible;
        }
    }

    pub fn selected(&self) -> &BTreeSet<String> {
        &self.selected
    }

    /// The selected students, or everyone on the list when nothing is selected.
    pub fn notification_targets(&self) -> Vec<&Defaulter> {
        if self.selected.is_empty() {
            return self.defaulters.iter().collect();
        }
        self.defaulters
            .iter()
            .filter(|d| self.selected.contains(&d.student.id))
            .collect()
    }

    /// Builds one outbound notification per target and clears the selection.
    pub fn take_notifications(&mut self) -> Vec<DefaulterNotification> {
        let threshold = self.threshold.value();
        let notifications = self
            .notification_targets()
            .into_iter()
            .map(|d| DefaulterNotification {
                student_id: d.student.id.clone(),
                subjects: d.defaulter_subjects.clone(),
                threshold,
            })
            .collect();
        self.selected.clear();
        notifications
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AttendanceCounts, Subject};

    fn student(id: &str, name: &str) -> StudentSummary {
        StudentSummary {
            id: id.to_string(),
            name: name.to_string(),
            student_id: format!("S-{id}"),
            email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        }
    }

    fn math(present: u32, total: u32) -> SubjectAttendanceStat {
        SubjectAttendanceStat::new(
            Subject {
                id: "math".to_string(),
                name: "Mathematics".to_string(),
                code: "MATH101".to_string(),
            },
            AttendanceCounts { present, total },
        )
    }

    fn physics(present: u32, total: u32) -> SubjectAttendanceStat {
        SubjectAttendanceStat::new(
            Subject {
                id: "phys".to_string(),
                name: "Physics".to_string(),
                code: "PHY101".to_string(),
            },
            AttendanceCounts { present, total },
        )
    }

    fn sample_roster() -> (Vec<StudentSummary>, AttendanceBySubject) {
        let roster = vec![
            student("1", "Avery Lee"),
            student("2", "Jules Moreno"),
            student("3", "Kiara Patel"),
        ];
        let mut attendance = AttendanceBySubject::new();
        attendance.insert("1".to_string(), vec![math(30, 40)]);
        attendance.insert("2".to_string(), vec![math(20, 40)]);
        attendance.insert("3".to_string(), vec![math(0, 0)]);
        (roster, attendance)
    }

    #[test]
    fn finds_students_below_threshold_in_roster_order() {
        let (roster, attendance) = sample_roster();
        let defaulters = find_defaulters(&roster, &attendance, 75.0);

        assert_eq!(defaulters.len(), 2);
        assert_eq!(defaulters[0].student.id, "2");
        assert_eq!(defaulters[0].defaulter_subjects.len(), 1);
        assert_eq!(defaulters[0].defaulter_subjects[0].percentage(), 50.0);
        assert_eq!(defaulters[1].student.id, "3");
        assert_eq!(defaulters[1].defaulter_subjects[0].percentage(), 0.0);
        assert!(defaulters.iter().all(|d| d.student.id != "1"));
    }

    #[test]
    fn never_returns_students_meeting_every_threshold() {
        let roster = vec![student("1", "Avery Lee")];
        let mut attendance = AttendanceBySubject::new();
        attendance.insert("1".to_string(), vec![math(38, 40), physics(31, 40)]);

        for threshold in [50.0, 60.0, 75.0] {
            assert!(find_defaulters(&roster, &attendance, threshold).is_empty());
        }
        let strict = find_defaulters(&roster, &attendance, 80.0);
        assert_eq!(strict.len(), 1);
        assert_eq!(strict[0].defaulter_subjects.len(), 1);
        assert_eq!(strict[0].defaulter_subjects[0].subject.code, "PHY101");
    }

    #[test]
    fn empty_totals_count_as_defaulting_for_any_positive_threshold() {
        let roster = vec![student("9", "New Student")];
        let mut attendance = AttendanceBySubject::new();
        attendance.insert("9".to_string(), vec![math(0, 0)]);

        for threshold in [0.5, 50.0, 100.0] {
            let defaulters = find_defaulters(&roster, &attendance, threshold);
            assert_eq!(defaulters.len(), 1);
            assert_eq!(defaulters[0].defaulter_subjects[0].percentage(), 0.0);
        }
    }

    #[test]
    fn students_without_stats_are_skipped() {
        let roster = vec![student("4", "No Stats")];
        assert!(find_defaulters(&roster, &AttendanceBySubject::new(), 75.0).is_empty());
    }

    #[test]
    fn board_drops_stale_refreshes() {
        let (roster, attendance) = sample_roster();
        let mut board = DefaulterBoard::default();

        let stale = board.begin_refresh();
        board.set_threshold(60.0).unwrap();
        let fresh = board.begin_refresh();

        assert!(board.apply(fresh, find_defaulters(&roster, &attendance, 60.0)));
        assert!(!board.apply(stale, find_defaulters(&roster, &attendance, 75.0)));
        assert_eq!(board.defaulters().len(), 2);
        assert_eq!(board.threshold().value(), 60.0);
    }

    #[test]
    fn threshold_change_invalidates_refresh_in_flight() {
        let roster = vec![student("1", "Avery Lee")];
        let mut attendance = AttendanceBySubject::new();
        attendance.insert("1".to_string(), vec![math(28, 40)]);

        let mut board = DefaulterBoard::new(Threshold::new(60.0).unwrap());
        let pending = board.begin_refresh();
        board.set_threshold(80.0).unwrap();

        assert!(!board.apply(pending, find_defaulters(&roster, &attendance, 60.0)));
        let ticket = board.begin_refresh();
        assert!(board.apply(ticket, find_defaulters(&roster, &attendance, 80.0)));
        assert_eq!(board.defaulters().len(), 1);
        assert_eq!(board.defaulters()[0].defaulter_subjects[0].percentage(), 70.0);
    }

    #[test]
    fn board_trims_entries_not_below_its_threshold() {
        let (roster, attendance) = sample_roster();
        let mut board = DefaulterBoard::new(Threshold::new(50.0).unwrap());
        let ticket = board.begin_refresh();

        assert!(board.apply(ticket, find_defaulters(&roster, &attendance, 75.0)));
        assert_eq!(board.defaulters().len(), 1);
        assert_eq!(board.defaulters()[0].student.id, "3");
    }

    #[test]
    fn board_rejects_out_of_range_thresholds() {
        let mut board = DefaulterBoard::default();
        assert!(board.set_threshold(101.0).is_err());
        assert_eq!(board.threshold().value(), 75.0);
    }

    #[test]
    fn search_matches_name_id_and_email() {
        let (roster, attendance) = sample_roster();
        let mut board = DefaulterBoard::default();
        let ticket = board.begin_refresh();
        board.apply(ticket, find_defaulters(&roster, &attendance, 75.0));

        assert_eq!(board.search("KIARA").len(), 1);
        assert_eq!(board.search("s-2").len(), 1);
        assert_eq!(board.search("example.com").len(), 2);
        assert!(board.search("avery").is_empty());
    }

    #[test]
    fn notification_targets_prefer_selection() {
        let (roster, attendance) = sample_roster();
        let mut board = DefaulterBoard::default();
        let ticket = board.begin_refresh();
        board.apply(ticket, find_defaulters(&roster, &attendance, 75.0));

        assert_eq!(board.notification_targets().len(), 2);
        board.toggle_selection("3");
        let targets = board.notification_targets();
        assert_eq!(targets.len(), 1);
        assert_eq!(targets[0].student.id, "3");

        let notifications = board.take_notifications();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].student_id, "3");
        assert_eq!(notifications[0].threshold, 75.0);
        assert!(board.selected().is_empty());
    }

    #[test]
    fn select_all_toggles_visible_students() {
        let (roster, attendance) = sample_roster();
        let mut board = DefaulterBoard::default();
        let ticket = board.begin_refresh();
        board.apply(ticket, find_defaulters(&roster, &attendance, 75.0));

        board.toggle_select_all("");
        assert_eq!(board.selected().len(), 2);
        board.toggle_select_all("");
        assert!(board.selected().is_empty());
        board.toggle_select_all("jules");
        assert_eq!(board.selected().len(), 1);
    }
}
