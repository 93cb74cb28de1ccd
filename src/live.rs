use std::str::FromStr;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, ApiError};
use crate::defaulters::DefaulterBoard;
use crate::fetch::{FetchTicket, Generations, Query};
use crate::models::{Defaulter, Grievance, GrievanceStatus};
use crate::notifications::{self, NotificationEvent, NotificationRelay};
use crate::push::{AttendanceRoom, ClientEvent, EventName, PushEvent, PushTransport};
use crate::session::Session;

/// Commands read from stdin while listening.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveCommand {
    List,
    Read(String),
    ReadAll,
    Dismiss(String),
    Threshold(f64),
    Refresh,
}

impl FromStr for LiveCommand {
    type Err = String;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let command = words.next().unwrap_or_default();
        let argument = words.next();
        match (command, argument) {
            ("list" | "ls", None) => Ok(LiveCommand::List),
            ("read", Some("all")) => Ok(LiveCommand::ReadAll),
            ("read", Some(id)) => Ok(LiveCommand::Read(id.to_string())),
            ("dismiss", Some(id)) => Ok(LiveCommand::Dismiss(id.to_string())),
            ("threshold", Some(value)) => value
                .parse()
                .map(LiveCommand::Threshold)
                .map_err(|_| format!("not a percentage: {value}")),
            ("refresh", None) => Ok(LiveCommand::Refresh),
            _ => Err(format!(
                "unknown command {line:?}; try list, read <id|all>, dismiss <id>, \
                 threshold <n>, refresh"
            )),
        }
    }
}

enum Refresh {
    Grievances(FetchTicket, Result<Vec<Grievance>, ApiError>),
    Defaulters(FetchTicket, Result<Vec<Defaulter>, ApiError>),
}

pub struct ListenOptions {
    pub student_id: String,
    pub is_student: bool,
    pub seed: bool,
    pub room: Option<AttendanceRoom>,
    /// Keeps a defaulter list current at this cut-off.
    pub board: Option<DefaulterBoard>,
}

fn is_open(grievance: &Grievance) -> bool {
    !matches!(
        grievance.status,
        GrievanceStatus::Resolved | GrievanceStatus::Rejected
    )
}

fn print_notification(notification: &NotificationEvent) {
    println!(
        "{} [{:?}] {}: {} ({})",
        if notification.read { " " } else { "*" },
        notification.kind,
        notification.title,
        notification.message,
        notification.id
    );
}

/// State of one listening session. Fetches run in the background so push
/// events keep flowing; only the latest fetch per query is applied.
struct Live {
    api: ApiClient,
    student_id: String,
    is_student: bool,
    relay: NotificationRelay,
    generations: Generations,
    board: Option<DefaulterBoard>,
    inflight: JoinSet<Refresh>,
}

impl Live {
    fn refresh_grievances(&mut self) {
        let ticket = self.generations.issue(Query::Grievances);
        let api = self.api.clone();
        self.inflight
            .spawn(async move { Refresh::Grievances(ticket, api.my_grievances().await) });
    }

    fn refresh_defaulters(&mut self) {
        let Some(board) = self.board.as_mut() else {
            return;
        };
        let ticket = board.begin_refresh();
        let threshold = board.threshold().value();
        let api = self.api.clone();
        self.inflight
            .spawn(async move { Refresh::Defaulters(ticket, api.defaulters(threshold).await) });
    }

    fn on_refresh(&mut self, refresh: Refresh) {
        match refresh {
            Refresh::Grievances(ticket, result) => {
                if !self.generations.is_current(&ticket) {
                    debug!(query = ?ticket.query(), "discarding stale grievance list");
                    return;
                }
                match result {
                    Ok(grievances) => {
                        let open = grievances.iter().filter(|g| is_open(g)).count();
                        println!("{} grievance(s), {open} still open.", grievances.len());
                    }
                    Err(err) => warn!(error = %err, "failed to refresh grievances"),
                }
            }
            Refresh::Defaulters(ticket, result) => {
                let Some(board) = self.board.as_mut() else {
                    return;
                };
                match result {
                    Ok(list) => {
                        if board.apply(ticket, list) {
                            println!(
                                "{} defaulter(s) below {}.",
                                board.defaulters().len(),
                                board.threshold()
                            );
                        }
                    }
                    Err(err) => warn!(error = %err, "failed to refresh defaulter list"),
                }
            }
        }
    }

    async fn on_event<T: PushTransport>(&mut self, session: &mut Session<T>, event: &PushEvent) {
        if let Some(notification) =
            notifications::synthesize(event, &self.student_id, Utc::now())
        {
            let id = notification.id.clone();
            if self.relay.append(notification) {
                if let Some(stored) = self.relay.get(&id) {
                    print_notification(stored);
                }
                println!("{} unread.", self.relay.unread_count());
            }
        }

        match event {
            PushEvent::GrievanceStatus(update)
                if self.is_student && update.student_id == self.student_id =>
            {
                self.refresh_grievances();
            }
            PushEvent::GrievanceSubmitted(submitted)
                if self.is_student && submitted.student_id == self.student_id =>
            {
                let join = ClientEvent::JoinGrievanceRoom(submitted.grievance_id.clone());
                if let Err(err) = session.push().emit(join).await {
                    warn!(error = %err, "failed to join grievance room");
                }
            }
            PushEvent::AttendanceUpdated(_) | PushEvent::AttendanceMarkedLive(_) => {
                self.refresh_defaulters();
            }
            _ => {}
        }
    }

    fn on_command(&mut self, command: LiveCommand) {
        match command {
            LiveCommand::List => {
                if self.relay.is_empty() {
                    println!("No notifications.");
                }
                for notification in self.relay.iter() {
                    print_notification(notification);
                }
            }
            LiveCommand::Read(id) => {
                if !self.relay.mark_read(&id) {
                    println!("No unread notification {id}.");
                }
            }
            LiveCommand::ReadAll => {
                println!("Marked {} notification(s) read.", self.relay.mark_all_read());
            }
            LiveCommand::Dismiss(id) => match self.relay.remove(&id) {
                Some(removed) => println!("Dismissed {}.", removed.title),
                None => println!("No notification {id}."),
            },
            LiveCommand::Threshold(value) => {
                let Some(board) = self.board.as_mut() else {
                    println!("Not watching defaulters.");
                    return;
                };
                match board.set_threshold(value) {
                    Ok(threshold) => {
                        println!("Threshold set to {threshold} ({}).", threshold.strictness());
                        self.refresh_defaulters();
                    }
                    Err(err) => println!("{err}"),
                }
            }
            LiveCommand::Refresh => {
                if self.is_student {
                    self.refresh_grievances();
                }
                self.refresh_defaulters();
            }
        }
    }
}

/// Follows the push channel until ctrl-c or the connection drops.
pub async fn listen<T: PushTransport>(
    session: &mut Session<T>,
    options: ListenOptions,
) -> anyhow::Result<()> {
    let mut live = Live {
        api: session.api().clone(),
        student_id: options.student_id,
        is_student: options.is_student,
        relay: NotificationRelay::new(),
        generations: Generations::default(),
        board: options.board,
        inflight: JoinSet::new(),
    };
    if options.seed {
        live.relay.extend_seed(notifications::seed(Utc::now()));
    }

    let push = session.push();
    if !push.is_connected() {
        anyhow::bail!("push channel unavailable");
    }
    push.on(EventName::AttendanceMarkedLive, |event| {
        if let PushEvent::AttendanceMarkedLive(marked) = event {
            println!(
                "Attendance marked live: {} {} in {}",
                marked.student_id,
                marked.status.as_str(),
                marked.subject_id
            );
        }
    });
    push.on(EventName::AttendanceUpdated, |event| {
        if let PushEvent::AttendanceUpdated(updated) = event {
            println!("Attendance updated for subject {}", updated.subject_id);
        }
    });
    push.emit(ClientEvent::SubscribeDefaulterAlerts).await?;
    push.emit(ClientEvent::SubscribeSystemNotifications).await?;
    if let Some(room) = &options.room {
        push.emit(ClientEvent::JoinAttendanceRoom(room.clone())).await?;
    }

    if live.is_student {
        match live.api.my_grievances().await {
            Ok(grievances) => {
                for grievance in grievances.iter().filter(|g| is_open(g)) {
                    session
                        .push()
                        .emit(ClientEvent::JoinGrievanceRoom(grievance.id.clone()))
                        .await?;
                }
            }
            Err(err) => warn!(error = %err, "failed to load grievances, not joining their rooms"),
        }
    }
    live.refresh_defaulters();

    for notification in live.relay.iter() {
        print_notification(notification);
    }
    info!(
        student = %live.student_id,
        handle = ?session.push().handle(),
        "listening for notifications"
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    loop {
        tokio::select! {
            event = session.push().next_event() => {
                let Some(event) = event else {
                    break;
                };
                live.on_event(session, &event).await;
            }
            Some(joined) = live.inflight.join_next(), if !live.inflight.is_empty() => {
                match joined {
                    Ok(refresh) => live.on_refresh(refresh),
                    Err(err) => warn!(error = %err, "background fetch failed"),
                }
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => match line.parse::<LiveCommand>() {
                    Ok(command) => live.on_command(command),
                    Err(message) => println!("{message}"),
                },
                Ok(None) => stdin_open = false,
                Err(err) => {
                    warn!(error = %err, "stopped reading commands");
                    stdin_open = false;
                }
            },
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    let push = session.push();
    push.off(EventName::AttendanceMarkedLive, None);
    push.off(EventName::AttendanceUpdated, None);
    if let Some(room) = options.room {
        if push.is_connected() {
            if let Err(err) = push.emit(ClientEvent::LeaveAttendanceRoom(room)).await {
                warn!(error = %err, "failed to leave attendance room");
            }
        }
    }

    println!(
        "Stopped with {} notification(s), {} unread.",
        live.relay.len(),
        live.relay.unread_count()
    );
    Ok(())
}
