use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use uuid::Uuid;

mod api;
mod config;
mod defaulters;
mod fetch;
mod live;
mod models;
mod notifications;
mod push;
mod report;
mod session;
mod threshold;
mod validation;
mod ws;

use api::{ApiClient, GrievanceFilter, ReportFilter, UserFilter};
use config::Config;
use defaulters::DefaulterBoard;
use live::ListenOptions;
use models::{
    AttendanceMark, AttendanceStatus, ClassType, Defaulter, Gender, GrievanceStatus, NewStudent,
    NewTeacher, Role,
};
use push::{AttendanceMarked, AttendanceRoom, ClientEvent, ConnectionManager};
use session::{Session, SessionError};
use threshold::{Threshold, Thresholds};
use validation::{FileChoice, GrievanceDraft};
use ws::WsTransport;

#[derive(Parser)]
#[command(name = "attendance-relay")]
#[command(
    about = "Attendance defaulter tracking and live notification client",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Classify an attendance percentage as Safe, Warning or Defaulter
    Classify {
        #[arg(long)]
        percentage: f64,
        #[arg(long)]
        safe: Option<f64>,
        #[arg(long)]
        warning: Option<f64>,
    },
    /// List students below the attendance threshold
    Defaulters {
        /// Defaults to ATTENDANCE_SAFE_THRESHOLD
        #[arg(long)]
        threshold: Option<f64>,
        #[arg(long)]
        search: Option<String>,
        /// Write the list as CSV
        #[arg(long)]
        export: bool,
        /// CSV path, defaults to defaulters_report_<threshold>percent.csv
        #[arg(long, requires = "export")]
        out: Option<PathBuf>,
    },
    /// Show institution-wide analytics alongside the defaulter count
    Overview {
        /// Defaults to ATTENDANCE_SAFE_THRESHOLD
        #[arg(long)]
        threshold: Option<f64>,
    },
    /// Show per-subject attendance for a student
    Attendance {
        /// Defaults to the signed-in student
        #[arg(long)]
        student: Option<String>,
    },
    /// Attendance reports for the signed-in teacher's subjects
    Reports {
        #[arg(long)]
        subject: Option<String>,
        /// Start date, YYYY-MM-DD
        #[arg(long)]
        from: Option<String>,
        /// End date, YYYY-MM-DD
        #[arg(long)]
        to: Option<String>,
        /// Defaulter cut-off for enrolled students; defaults to ATTENDANCE_SAFE_THRESHOLD
        #[arg(long)]
        threshold: Option<f64>,
        /// Write one <code>_attendance_report.csv per subject here
        #[arg(long)]
        export_dir: Option<PathBuf>,
    },
    /// Upload an attendance sheet for a subject
    Upload {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        subject: String,
        #[arg(long, value_enum, default_value = "theory")]
        class_type: ClassType,
    },
    /// Record attendance for several students at once
    Mark {
        #[arg(long)]
        subject: String,
        #[arg(long, value_enum, default_value = "theory")]
        class_type: ClassType,
        #[arg(long)]
        present: Vec<String>,
        #[arg(long)]
        absent: Vec<String>,
        #[arg(long)]
        late: Vec<String>,
        #[arg(long)]
        excused: Vec<String>,
    },
    /// Submit an attendance grievance
    Grievance {
        #[arg(long)]
        subject: String,
        #[arg(long)]
        title: String,
        #[arg(long)]
        description: String,
        #[arg(long = "attach")]
        attachments: Vec<PathBuf>,
    },
    /// List grievances
    Grievances {
        /// All students' grievances (teachers and admins)
        #[arg(long)]
        all: bool,
        #[arg(long, value_enum, requires = "all")]
        status: Option<GrievanceStatus>,
        #[arg(long, requires = "all")]
        subject: Option<String>,
    },
    /// Update the status of a grievance
    Review {
        #[arg(long)]
        grievance: String,
        #[arg(long, value_enum)]
        status: GrievanceStatus,
        #[arg(long)]
        response: Option<String>,
    },
    /// List user accounts
    Users {
        #[arg(long, value_enum)]
        role: Option<Role>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(long, default_value_t = 10)]
        limit: u32,
    },
    /// Create a teacher account
    CreateTeacher {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long, value_enum)]
        gender: Gender,
        #[arg(long)]
        number: String,
        /// Department name or id
        #[arg(long)]
        department: String,
    },
    /// Create a student account
    CreateStudent {
        #[arg(long)]
        name: String,
        #[arg(long)]
        student_id: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long)]
        division: String,
        #[arg(long, default_value = "")]
        batch: String,
        #[arg(long)]
        contact: String,
        #[arg(long, value_enum)]
        gender: Gender,
        /// Department name or id
        #[arg(long)]
        department: String,
        /// Semester number or id within the department
        #[arg(long)]
        semester: String,
    },
    /// Enable or disable a user account
    ToggleUser {
        #[arg(long)]
        id: String,
        #[arg(long, value_enum)]
        role: Role,
    },
    /// Show or change system settings
    Settings {
        #[arg(long)]
        attendance_threshold: Option<f64>,
        #[arg(long)]
        alert_threshold: Option<f64>,
    },
    /// Send live attendance alerts to defaulters
    Notify {
        /// Defaults to ATTENDANCE_SAFE_THRESHOLD
        #[arg(long)]
        threshold: Option<f64>,
        /// Only these students; defaults to every defaulter
        #[arg(long = "student")]
        students: Vec<String>,
        /// Only defaulters matching this name, student id or email
        #[arg(long, conflicts_with = "students")]
        search: Option<String>,
    },
    /// Mark a student's attendance for a class in progress
    MarkLive {
        #[arg(long)]
        subject: String,
        /// Class session id; a new one is generated when omitted
        #[arg(long)]
        class: Option<String>,
        #[arg(long)]
        student: String,
        #[arg(long, value_enum, default_value = "present")]
        status: AttendanceStatus,
    },
    /// Follow live notifications until interrupted. Reads list, read, dismiss,
    /// threshold and refresh commands from stdin.
    Listen {
        /// Defaults to the signed-in user
        #[arg(long)]
        student: Option<String>,
        /// Include sample notifications
        #[arg(long)]
        seed: bool,
        #[arg(long, requires = "class")]
        subject: Option<String>,
        #[arg(long, requires = "subject")]
        class: Option<String>,
        /// Keep the defaulter list current (teachers and admins)
        #[arg(long)]
        watch_defaulters: bool,
        /// Defaults to ATTENDANCE_SAFE_THRESHOLD
        #[arg(long, requires = "watch_defaulters")]
        threshold: Option<f64>,
    },
}

fn init_tracing(log_json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn sign_in(config: &Config) -> anyhow::Result<Session<WsTransport>> {
    let api = ApiClient::new(&config.api_url).context("failed to build HTTP client")?;
    let push = ConnectionManager::new(WsTransport, &config.socket_url);
    let mut session = Session::new(api, push);

    let result = match &config.credentials {
        Some(credentials) => session.login(credentials).await.map(|_| ()),
        None => session.restore().await.map(|_| ()),
    };
    match result {
        Ok(()) => Ok(session),
        Err(SessionError::NotAuthenticated) => {
            bail!("not signed in; set ATTENDANCE_EMAIL, ATTENDANCE_PASSWORD and ATTENDANCE_ROLE")
        }
        Err(err) => Err(err).context("sign-in failed"),
    }
}

fn print_defaulters(defaulters: &[&Defaulter], thresholds: &Thresholds) {
    for defaulter in defaulters {
        println!(
            "- {} ({}, {})",
            defaulter.student.name, defaulter.student.student_id, defaulter.student.email
        );
        for stat in &defaulter.defaulter_subjects {
            println!(
                "    {} {}: {:.1}% ({}/{}) {}",
                stat.subject.code,
                stat.subject.name,
                stat.percentage(),
                stat.present,
                stat.total,
                thresholds.classify(stat.percentage()).label()
            );
        }
    }
}

async fn load_board(
    session: &Session<WsTransport>,
    threshold: Threshold,
) -> anyhow::Result<DefaulterBoard> {
    let mut board = DefaulterBoard::new(threshold);
    let ticket = board.begin_refresh();
    let defaulters = session
        .api()
        .defaulters(threshold.value())
        .await
        .context("failed to load defaulter list")?;
    board.apply(ticket, defaulters);
    Ok(board)
}

/// Resolves a department given by name (case-insensitive) or id.
async fn find_department(api: &ApiClient, wanted: &str) -> anyhow::Result<models::Department> {
    let departments = api
        .departments()
        .await
        .context("failed to load departments")?;
    departments
        .into_iter()
        .find(|d| d.id == wanted || d.name.eq_ignore_ascii_case(wanted))
        .with_context(|| format!("no department named {wanted:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env().context("invalid configuration")?;
    init_tracing(config.log_json);

    if let Commands::Classify {
        percentage,
        safe,
        warning,
    } = cli.command
    {
        let thresholds = Thresholds::new(
            safe.unwrap_or(config.thresholds.safe),
            warning.unwrap_or(config.thresholds.warning),
        )?;
        println!(
            "{:.1}% is {} (safe >= {}, warning >= {})",
            percentage,
            thresholds.classify(percentage).label(),
            thresholds.safe,
            thresholds.warning
        );
        return Ok(());
    }

    let mut session = sign_in(&config).await?;
    let outcome = run(&mut session, &config, cli.command).await;
    session.logout().await;
    outcome
}

async fn run(
    session: &mut Session<WsTransport>,
    config: &Config,
    command: Commands,
) -> anyhow::Result<()> {
    let cut_off =
        |threshold: Option<f64>| Threshold::new(threshold.unwrap_or(config.thresholds.safe));

    match command {
        Commands::Classify { .. } => {}
        Commands::Defaulters {
            threshold,
            search,
            export,
            out,
        } => {
            session.require(&[Role::Teacher, Role::Admin])?;
            let board = load_board(session, cut_off(threshold)?).await?;
            let listed = board.search(search.as_deref().unwrap_or_default());

            if listed.is_empty() {
                println!("No defaulters below {}.", board.threshold());
            } else {
                println!(
                    "{} of {} defaulter(s) below {} ({} threshold):",
                    listed.len(),
                    board.defaulters().len(),
                    board.threshold(),
                    board.threshold().strictness()
                );
                print_defaulters(&listed, &config.thresholds);
            }

            if export {
                let path = out.unwrap_or_else(|| {
                    PathBuf::from(report::export_file_name(board.threshold().value()))
                });
                let file = std::fs::File::create(&path)
                    .with_context(|| format!("failed to create {}", path.display()))?;
                let rows: Vec<Defaulter> = listed.into_iter().cloned().collect();
                let written = report::write_defaulters_csv(file, &rows)?;
                println!("Wrote {written} rows to {}.", path.display());
            }
        }
        Commands::Overview { threshold } => {
            session.require(&[Role::Admin])?;
            let threshold = cut_off(threshold)?;
            let api = session.api();
            let (overview, subjects, teachers, listing) = tokio::join!(
                api.analytics_overview(),
                api.subject_analytics(),
                api.teacher_analytics(),
                api.defaulters(threshold.value())
            );

            match overview {
                Ok(overview) => {
                    let totals = &overview.overview;
                    println!(
                        "Students {} | Teachers {} | Departments {} | Subjects {}",
                        totals.total_students,
                        totals.total_teachers,
                        totals.total_departments,
                        totals.total_subjects
                    );
                    println!(
                        "Current attendance rate: {:.1}% ({})",
                        totals.current_attendance_rate,
                        config
                            .thresholds
                            .classify(totals.current_attendance_rate)
                            .label()
                    );
                    for department in &overview.department_stats {
                        println!(
                            "- {}: {} students, {} semesters",
                            department.name, department.student_count, department.semester_count
                        );
                    }
                    for point in &overview.weekly_trend {
                        println!("  {} {:.1}%", point.date, point.attendance_rate);
                    }
                }
                Err(err) => println!("Analytics unavailable: {err}"),
            }
            match subjects {
                Ok(subjects) => {
                    println!("Subjects:");
                    for entry in subjects.iter().take(10) {
                        println!(
                            "- {} {} ({}): {} classes, {:.1}% {}",
                            entry.subject.code,
                            entry.subject.name,
                            entry.subject.department.as_deref().unwrap_or("no department"),
                            entry.total_classes,
                            entry.average_attendance,
                            config.thresholds.classify(entry.average_attendance).label()
                        );
                    }
                }
                Err(err) => println!("Subject analytics unavailable: {err}"),
            }
            match teachers {
                Ok(mut teachers) => {
                    teachers.sort_by(|a, b| b.classes_recorded.cmp(&a.classes_recorded));
                    println!("Most active teachers:");
                    for entry in teachers.iter().take(8) {
                        println!(
                            "- {} ({}): {} classes, {} subjects",
                            entry.teacher.name,
                            entry.teacher.department.as_deref().unwrap_or("no department"),
                            entry.classes_recorded,
                            entry.subjects_handled
                        );
                    }
                }
                Err(err) => println!("Teacher analytics unavailable: {err}"),
            }
            match listing {
                Ok(list) => {
                    let list = defaulters::retain_below(list, threshold.value());
                    println!("Defaulters below {threshold}: {}", list.len());
                }
                Err(err) => println!("Defaulter list unavailable: {err}"),
            }
        }
        Commands::Attendance { student } => {
            let user = session.require(&[Role::Student, Role::Teacher, Role::Admin])?;
            let student_id = match student {
                Some(id) => id,
                None if user.role == Role::Student => user.id.clone(),
                None => bail!("--student is required for {} accounts", user.role),
            };
            let attendance = session
                .api()
                .student_attendance(&student_id)
                .await
                .context("failed to load attendance")?;

            if attendance.subject_stats.is_empty() {
                println!("No attendance recorded yet.");
                return Ok(());
            }
            for stat in &attendance.subject_stats {
                println!(
                    "- {} {}: {:.1}% ({}/{}) {}",
                    stat.subject.code,
                    stat.subject.name,
                    stat.percentage(),
                    stat.present,
                    stat.total,
                    config.thresholds.classify(stat.percentage()).label()
                );
            }
            println!("By tier:");
            let summaries =
                report::summarize_by_tier(&attendance.subject_stats, &config.thresholds);
            for summary in summaries {
                println!(
                    "- {}: {} subject(s), avg {:.1}%",
                    summary.tier.label(),
                    summary.count,
                    summary.avg_percentage
                );
            }
            let latest = attendance
                .attendance
                .iter()
                .filter_map(|record| Some((record.date()?, record.time()?, record)))
                .max_by_key(|(date, time, _)| (*date, *time));
            match latest {
                Some((date, time, record)) => println!(
                    "{} attendance records, last {} in {} on {} at {}.",
                    attendance.attendance.len(),
                    record.status.as_str(),
                    record.subject.code,
                    date.format("%Y-%m-%d"),
                    time.format("%H:%M")
                ),
                None => println!("{} attendance records.", attendance.attendance.len()),
            }
        }
        Commands::Reports {
            subject,
            from,
            to,
            threshold,
            export_dir,
        } => {
            session.require(&[Role::Teacher])?;
            let threshold = cut_off(threshold)?;
            let filter = ReportFilter {
                subject_id: subject,
                start_date: from,
                end_date: to,
            };
            let api = session.api();
            let (allocations, reports) =
                tokio::join!(api.teacher_allocations(), api.attendance_reports(&filter));

            let allocations = match allocations {
                Ok(allocations) => {
                    println!("Allocations:");
                    for allocation in report::unique_subjects(&allocations) {
                        println!(
                            "- {} {} ({}, division {}{}): {}/{} classes conducted",
                            allocation.subject.code,
                            allocation.subject.name,
                            allocation.class_type.as_str(),
                            allocation.division,
                            if allocation.batch.is_empty() {
                                String::new()
                            } else {
                                format!(", batch {}", allocation.batch)
                            },
                            allocation.total_conducted,
                            allocation.total_planned
                        );
                    }
                    Some(allocations)
                }
                Err(err) => {
                    println!("Allocations unavailable: {err}");
                    None
                }
            };
            let reports = reports.context("failed to load attendance reports")?;

            if reports.is_empty() {
                println!("No attendance recorded for the selected period.");
            }
            for entry in &reports {
                let stats = &entry.stats;
                println!(
                    "- {} {}: {:.0}% {} ({} classes: {} present, {} absent, {} late, {} excused)",
                    entry.subject.code,
                    entry.subject.name,
                    stats.percentage(),
                    config.thresholds.classify(stats.percentage().round()).label(),
                    stats.total,
                    stats.present,
                    stats.absent,
                    stats.late,
                    stats.excused
                );
            }

            if let Some(allocations) = &allocations {
                let roster = report::allocation_roster(allocations);
                let attendance = report::tally_reports(&reports);
                let found = defaulters::find_defaulters(&roster, &attendance, threshold.value());
                println!(
                    "{} of {} enrolled student(s) below {threshold}:",
                    found.len(),
                    roster.len()
                );
                let listed: Vec<&Defaulter> = found.iter().collect();
                print_defaulters(&listed, &config.thresholds);
            }

            if let Some(dir) = export_dir {
                std::fs::create_dir_all(&dir)
                    .with_context(|| format!("failed to create {}", dir.display()))?;
                for entry in &reports {
                    let path = dir.join(report::report_file_name(&entry.subject.code));
                    let file = std::fs::File::create(&path)
                        .with_context(|| format!("failed to create {}", path.display()))?;
                    let written = report::write_report_csv(file, entry)?;
                    println!("Wrote {written} records to {}.", path.display());
                }
            }
        }
        Commands::Upload {
            csv,
            subject,
            class_type,
        } => {
            session.require(&[Role::Teacher])?;
            let file = FileChoice::from_path(&csv)
                .with_context(|| format!("cannot read {}", csv.display()))?;
            validation::validate_upload(&subject, &file)?;
            let summary = session
                .api()
                .upload_attendance_csv(&csv, &subject, class_type)
                .await
                .context("attendance upload failed")?;
            println!(
                "Uploaded {}: {} {} records created.",
                csv.display(),
                summary.records_created,
                class_type.as_str()
            );
        }
        Commands::Mark {
            subject,
            class_type,
            present,
            absent,
            late,
            excused,
        } => {
            session.require(&[Role::Teacher])?;
            let marks: Vec<AttendanceMark> = [
                (AttendanceStatus::Present, present),
                (AttendanceStatus::Absent, absent),
                (AttendanceStatus::Late, late),
                (AttendanceStatus::Excused, excused),
            ]
            .into_iter()
            .flat_map(|(status, students)| {
                let subject = subject.clone();
                students.into_iter().map(move |student_id| AttendanceMark {
                    student_id,
                    subject_id: subject.clone(),
                    status,
                    class_type,
                })
            })
            .collect();
            if marks.is_empty() {
                bail!("no students given; use --present, --absent, --late or --excused");
            }
            let sent = session
                .api()
                .mark_attendance(&marks)
                .await
                .context("failed to record attendance")?;
            println!("Recorded {sent} {} attendance mark(s).", class_type.as_str());
        }
        Commands::Grievance {
            subject,
            title,
            description,
            attachments,
        } => {
            session.require(&[Role::Student])?;
            let attachments = attachments
                .iter()
                .map(|path| {
                    FileChoice::from_path(path)
                        .with_context(|| format!("cannot read {}", path.display()))
                })
                .collect::<anyhow::Result<Vec<_>>>()?;
            let draft = GrievanceDraft {
                subject_id: subject,
                title,
                description,
                attachments,
            };
            validation::validate_grievance(&draft)?;
            let grievance = session
                .api()
                .submit_grievance(&draft)
                .await
                .context("grievance submission failed")?;
            println!("Grievance {} submitted ({}).", grievance.id, grievance.status);
        }
        Commands::Grievances {
            all,
            status,
            subject,
        } => {
            let result = if all {
                session.require(&[Role::Teacher, Role::Admin])?;
                let filter = GrievanceFilter {
                    status,
                    subject_id: subject,
                };
                session.api().all_grievances(&filter).await
            } else {
                session.require(&[Role::Student])?;
                session.api().my_grievances().await
            };
            let grievances = result.context("failed to load grievances")?;

            if grievances.is_empty() {
                println!("No grievances found.");
            }
            for grievance in grievances {
                println!(
                    "- [{}] {} ({}) filed {}, updated {}: {}",
                    grievance.status,
                    grievance.title,
                    grievance.subject.code,
                    grievance.created_at.format("%Y-%m-%d"),
                    grievance.updated_at.format("%Y-%m-%d"),
                    grievance.response.as_deref().unwrap_or("awaiting response")
                );
                println!(
                    "    {} ({} attachment(s))",
                    grievance.description,
                    grievance.attachments.len()
                );
            }
        }
        Commands::Review {
            grievance,
            status,
            response,
        } => {
            session.require(&[Role::Teacher, Role::Admin])?;
            let updated = session
                .api()
                .update_grievance_status(&grievance, status, response.as_deref())
                .await
                .context("failed to update grievance")?;
            println!("Grievance {} is now {}.", updated.id, updated.status);
        }
        Commands::Users {
            role,
            search,
            page,
            limit,
        } => {
            session.require(&[Role::Admin])?;
            let filter = UserFilter {
                role,
                search,
                page: Some(page),
                limit: Some(limit),
            };
            let listing = session
                .api()
                .users(&filter)
                .await
                .context("failed to load users")?;
            let pagination = listing.pagination;
            println!(
                "{} total users, {} showing (page {} of {})",
                pagination.total_records, pagination.count, pagination.current, pagination.total
            );
            for user in &listing.users {
                println!(
                    "- {} <{}> {}{}{} [{}]",
                    user.display_name(),
                    user.display_email(),
                    user.role,
                    user.department_name()
                        .map(|name| format!(", {name}"))
                        .unwrap_or_default(),
                    if user.is_active() { "" } else { ", inactive" },
                    user.id
                );
            }
        }
        Commands::CreateTeacher {
            name,
            email,
            password,
            gender,
            number,
            department,
        } => {
            session.require(&[Role::Admin])?;
            let api = session.api();
            let department = find_department(api, &department).await?;
            let teacher = NewTeacher {
                teacher_name: name,
                teacher_email: email,
                teacher_password: password,
                teacher_gender: gender,
                teacher_number: number,
                department: department.name,
            };
            api.create_teacher(&teacher)
                .await
                .context("failed to create teacher")?;
            println!(
                "Created teacher {} in {}.",
                teacher.teacher_email, teacher.department
            );
        }
        Commands::CreateStudent {
            name,
            student_id,
            email,
            password,
            division,
            batch,
            contact,
            gender,
            department,
            semester,
        } => {
            session.require(&[Role::Admin])?;
            let api = session.api();
            let department = find_department(api, &department).await?;
            let semesters = api
                .semesters(&department.id)
                .await
                .context("failed to load semesters")?;
            let semester = semesters
                .into_iter()
                .find(|s| s.id == semester || s.semester_number.to_string() == semester)
                .with_context(|| format!("no semester {semester:?} in {}", department.name))?;
            let student = NewStudent {
                name,
                student_id,
                email,
                password,
                division,
                batch,
                contact_number: contact,
                gender,
                department_id: department.id,
                semester_id: semester.id,
            };
            api.create_student(&student)
                .await
                .context("failed to create student")?;
            println!(
                "Created student {} in {} semester {} ({}).",
                student.student_id,
                department.name,
                semester.semester_number,
                semester.academic_year
            );
        }
        Commands::ToggleUser { id, role } => {
            session.require(&[Role::Admin])?;
            session
                .api()
                .toggle_user_status(&id, role)
                .await
                .context("failed to toggle user status")?;
            println!("Toggled status of {role} {id}.");
        }
        Commands::Settings {
            attendance_threshold,
            alert_threshold,
        } => {
            session.require(&[Role::Admin])?;
            let mut settings = session
                .api()
                .system_settings()
                .await
                .context("failed to load settings")?;
            if attendance_threshold.is_some() || alert_threshold.is_some() {
                if let Some(value) = attendance_threshold {
                    settings.attendance_threshold = value;
                }
                if let Some(value) = alert_threshold {
                    settings.defaulter_alert_threshold = value;
                }
                validation::validate_settings(&settings)?;
                session
                    .api()
                    .update_system_settings(&settings)
                    .await
                    .context("failed to save settings")?;
                println!("Settings saved.");
            }
            println!("{}", serde_json::to_string_pretty(&settings)?);
        }
        Commands::Notify {
            threshold,
            students,
            search,
        } => {
            session.require(&[Role::Teacher, Role::Admin])?;
            let mut board = load_board(session, cut_off(threshold)?).await?;
            for student in &students {
                board.toggle_selection(student);
            }
            if let Some(term) = &search {
                board.toggle_select_all(term);
                if board.selected().is_empty() {
                    println!("No defaulters match {term:?}.");
                    return Ok(());
                }
            }
            let notifications = board.take_notifications();
            if notifications.is_empty() {
                println!("No defaulters to notify.");
                return Ok(());
            }
            if !session.push().is_connected() {
                bail!("push channel unavailable, no alerts sent");
            }
            let count = notifications.len();
            for notification in notifications {
                session
                    .push()
                    .emit(ClientEvent::DefaulterNotification(notification))
                    .await
                    .context("failed to send attendance alert")?;
            }
            println!("Sent attendance alerts to {count} student(s).");
        }
        Commands::MarkLive {
            subject,
            class,
            student,
            status,
        } => {
            session.require(&[Role::Teacher])?;
            let class_id = class.unwrap_or_else(|| Uuid::new_v4().to_string());
            let push = session.push();
            if !push.is_connected() {
                bail!("push channel unavailable, attendance not marked");
            }
            let room = AttendanceRoom {
                subject_id: subject.clone(),
                class_id: class_id.clone(),
            };
            push.emit(ClientEvent::JoinAttendanceRoom(room.clone())).await?;
            push.emit(ClientEvent::MarkAttendanceLive(AttendanceMarked {
                subject_id: subject,
                class_id: class_id.clone(),
                student_id: student.clone(),
                status,
            }))
            .await?;
            push.emit(ClientEvent::LeaveAttendanceRoom(room)).await?;
            println!("Marked {student} {} in class {class_id}.", status.as_str());
        }
        Commands::Listen {
            student,
            seed,
            subject,
            class,
            watch_defaulters,
            threshold,
        } => {
            let user = session.require(&[Role::Student, Role::Teacher, Role::Admin])?;
            let is_student = user.role == Role::Student;
            let student_id = student.unwrap_or_else(|| user.id.clone());
            let board = if watch_defaulters {
                session.require(&[Role::Teacher, Role::Admin])?;
                Some(DefaulterBoard::new(cut_off(threshold)?))
            } else {
                None
            };
            let options = ListenOptions {
                student_id,
                is_student,
                seed,
                room: subject
                    .zip(class)
                    .map(|(subject_id, class_id)| AttendanceRoom {
                        subject_id,
                        class_id,
                    }),
                board,
            };
            live::listen(session, options).await?;
        }
    }

    Ok(())
}
