//! Console front end: command parsing, the terminal navigation host, and
//! the dispatcher that turns commands into service calls.
//!
//! Screens follow the navigation gate. Fleet and inbox commands are only
//! served while the gate is `Authenticated`; login and registration only
//! while it is not.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tracing::debug;

use shuttle::map::MapViewport;
use shuttle::services::auth::AuthGateway;
use shuttle::services::fleet::{BusId, Fleet, StopId};
use shuttle::services::navigation::{Destination, NavState, NavigationError, NavigationHost};
use shuttle::services::notification::NotificationCenter;
use shuttle::services::validation::RegistrationForm;
use shuttle::session::{Profile, Session};

/// How long a command waits for the gate to reflect a session change.
const SETTLE_TIMEOUT: Duration = Duration::from_secs(2);

pub const HELP: &str = "\
commands:
  login <email> <password>
  register <first> <last> <student-id> <email> <password>
  reset <email>
  logout
  whoami
  profile <first> <last>
  passwd <current> <new>
  buses | routes | map
  eta <bus-id> <stop-id>
  notifications
  read <n|all>
  delete <n>
  help | quit";

// =============================================================================
// COMMANDS
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Login { email: String, password: String },
    Register { first_name: String, last_name: String, student_id: String, email: String, password: String },
    Reset { email: String },
    Logout,
    Whoami,
    Profile { first_name: String, last_name: String },
    Passwd { current: String, new: String },
    Buses,
    Routes,
    Map,
    Eta { bus: BusId, stop: StopId },
    Notifications,
    /// 1-based position in the `notifications` listing, or every unread one.
    Read(Option<usize>),
    Delete(usize),
    Help,
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("empty command")]
    Empty,
    #[error("unknown command '{0}'; try 'help'")]
    Unknown(String),
    #[error("usage: {0}")]
    Usage(&'static str),
    #[error("not a number: '{0}'")]
    NotANumber(String),
}

impl FromStr for Command {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let name = words.next().ok_or(ParseError::Empty)?;
        let args: Vec<String> = words.map(str::to_owned).collect();

        let command = match (name, args.as_slice()) {
            ("login", [email, password]) => Self::Login { email: email.clone(), password: password.clone() },
            ("login", _) => return Err(ParseError::Usage("login <email> <password>")),
            ("register", [first, last, student_id, email, password]) => Self::Register {
                first_name: first.clone(),
                last_name: last.clone(),
                student_id: student_id.clone(),
                email: email.clone(),
                password: password.clone(),
            },
            ("register", _) => {
                return Err(ParseError::Usage("register <first> <last> <student-id> <email> <password>"));
            }
            ("reset", [email]) => Self::Reset { email: email.clone() },
            ("reset", _) => return Err(ParseError::Usage("reset <email>")),
            ("logout", []) => Self::Logout,
            ("whoami", []) => Self::Whoami,
            ("profile", [first, last]) => Self::Profile { first_name: first.clone(), last_name: last.clone() },
            ("profile", _) => return Err(ParseError::Usage("profile <first> <last>")),
            ("passwd", [current, new]) => Self::Passwd { current: current.clone(), new: new.clone() },
            ("passwd", _) => return Err(ParseError::Usage("passwd <current> <new>")),
            ("buses", []) => Self::Buses,
            ("routes", []) => Self::Routes,
            ("map", []) => Self::Map,
            ("eta", [bus, stop]) => Self::Eta { bus: number(bus)?, stop: number(stop)? },
            ("eta", _) => return Err(ParseError::Usage("eta <bus-id> <stop-id>")),
            ("notifications", []) => Self::Notifications,
            ("read", [target]) if target == "all" => Self::Read(None),
            ("read", [n]) => Self::Read(Some(number(n)?)),
            ("read", _) => return Err(ParseError::Usage("read <n|all>")),
            ("delete", [n]) => Self::Delete(number(n)?),
            ("delete", _) => return Err(ParseError::Usage("delete <n>")),
            ("help", _) => Self::Help,
            ("quit" | "exit", _) => Self::Quit,
            (other, _) => return Err(ParseError::Unknown(other.to_owned())),
        };
        Ok(command)
    }
}

fn number<T: FromStr>(word: &str) -> Result<T, ParseError> {
    word.parse().map_err(|_| ParseError::NotANumber(word.to_owned()))
}

// =============================================================================
// NAVIGATION HOST
// =============================================================================

#[derive(Debug, Default)]
struct Screens {
    visible: HashSet<Destination>,
    current: Option<Destination>,
    route: Option<String>,
}

/// Terminal stand-in for the app shell. Rejects any call that would leave
/// the current destination hidden.
#[derive(Debug, Default)]
pub struct ConsoleHost {
    screens: Mutex<Screens>,
}

impl ConsoleHost {
    #[must_use]
    pub fn current(&self) -> Option<Destination> {
        self.screens.lock().ok().and_then(|s| s.current)
    }

    #[must_use]
    pub fn route(&self) -> Option<String> {
        self.screens.lock().ok().and_then(|s| s.route.clone())
    }

    fn with_screens<T>(&self, f: impl FnOnce(&mut Screens) -> Result<T, NavigationError>) -> Result<T, NavigationError> {
        let mut screens = self
            .screens
            .lock()
            .map_err(|_| NavigationError::Host("screen state poisoned".into()))?;
        f(&mut screens)
    }
}

#[async_trait::async_trait]
impl NavigationHost for ConsoleHost {
    async fn set_visible(&self, destination: Destination, visible: bool) -> Result<(), NavigationError> {
        self.with_screens(|screens| {
            if visible {
                screens.visible.insert(destination);
            } else {
                if screens.current == Some(destination) {
                    return Err(NavigationError::Host(format!("cannot hide current destination {destination:?}")));
                }
                screens.visible.remove(&destination);
            }
            Ok(())
        })
    }

    async fn set_current(&self, destination: Destination) -> Result<(), NavigationError> {
        self.with_screens(|screens| {
            if !screens.visible.contains(&destination) {
                return Err(NavigationError::Host(format!("{destination:?} is not visible")));
            }
            screens.current = Some(destination);
            Ok(())
        })
    }

    async fn go_to(&self, route: &str) -> Result<(), NavigationError> {
        self.with_screens(|screens| {
            screens.route = Some(route.to_owned());
            Ok(())
        })?;
        println!("[{route}]");
        Ok(())
    }
}

// =============================================================================
// DISPATCH
// =============================================================================

/// What the read loop should do after a command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Flow {
    Continue(String),
    Quit,
}

pub struct Console {
    gateway: Arc<AuthGateway>,
    fleet: Arc<Fleet>,
    notifications: Arc<NotificationCenter>,
    nav: watch::Receiver<NavState>,
    viewport: MapViewport,
}

impl Console {
    #[must_use]
    pub fn new(
        gateway: Arc<AuthGateway>,
        fleet: Arc<Fleet>,
        notifications: Arc<NotificationCenter>,
        nav: watch::Receiver<NavState>,
    ) -> Self {
        Self { gateway, fleet, notifications, nav, viewport: MapViewport::default() }
    }

    /// Parse and run one input line.
    pub async fn handle_line(&self, line: &str) -> Flow {
        match line.parse::<Command>() {
            Ok(command) => self.execute(command).await,
            Err(ParseError::Empty) => Flow::Continue(String::new()),
            Err(e) => Flow::Continue(e.to_string()),
        }
    }

    pub async fn execute(&self, command: Command) -> Flow {
        debug!(?command, "console command");
        let state = *self.nav.borrow();
        let output = match (command, state) {
            (Command::Quit, _) => return Flow::Quit,
            (Command::Help, _) => HELP.to_owned(),
            (Command::Login { email, password }, NavState::Unauthenticated) => {
                let ok = self.gateway.sign_in(&email, &password).await.is_ok();
                self.settle().await;
                if ok { self.greeting().await } else { "Invalid email or password.".to_owned() }
            }
            (Command::Register { first_name, last_name, student_id, email, password }, NavState::Unauthenticated) => {
                let form = RegistrationForm {
                    first_name,
                    last_name,
                    student_id,
                    email,
                    confirm_password: password.clone(),
                    password,
                    accepted_terms: true,
                };
                match form.validate() {
                    Err(e) => e.to_string(),
                    Ok(profile) => {
                        let ok = self.gateway.sign_up(&profile, &form.password).await.is_ok();
                        self.settle().await;
                        if ok { self.greeting().await } else { "Registration failed.".to_owned() }
                    }
                }
            }
            (Command::Reset { email }, NavState::Unauthenticated) => match self.gateway.reset_password(&email).await {
                Ok(()) => format!("Password reset instructions sent to {email}."),
                Err(_) => "Could not send reset instructions.".to_owned(),
            },
            (Command::Login { .. } | Command::Register { .. } | Command::Reset { .. }, NavState::Authenticated) => {
                "Already signed in; logout first.".to_owned()
            }
            (Command::Logout, _) => {
                let _ = self.gateway.sign_out().await;
                self.settle().await;
                "Signed out.".to_owned()
            }
            (_, NavState::Unauthenticated) => "Please log in first.".to_owned(),
            (Command::Whoami, NavState::Authenticated) => self.whoami().await,
            (Command::Profile { first_name, last_name }, NavState::Authenticated) => {
                self.update_name(first_name, last_name).await
            }
            (Command::Passwd { current, new }, NavState::Authenticated) => {
                match self.gateway.change_password(&current, &new).await {
                    Ok(()) => "Password changed.".to_owned(),
                    Err(_) => "Password change failed.".to_owned(),
                }
            }
            (Command::Buses, NavState::Authenticated) => self.buses().await,
            (Command::Routes, NavState::Authenticated) => self.routes(),
            (Command::Map, NavState::Authenticated) => self.map().await,
            (Command::Eta { bus, stop }, NavState::Authenticated) => {
                match self.fleet.estimated_arrival(bus, stop).await {
                    Some(at) => {
                        let minutes = (at - time::OffsetDateTime::now_utc()).whole_minutes().max(1);
                        format!("Bus {bus} reaches stop {stop} in about {minutes} min.")
                    }
                    None => format!("No bus {bus}."),
                }
            }
            (Command::Notifications, NavState::Authenticated) => self.inbox().await,
            (Command::Read(target), NavState::Authenticated) => self.read(target).await,
            (Command::Delete(n), NavState::Authenticated) => self.delete(n).await,
        };
        Flow::Continue(output)
    }

    /// Wait until the gate reflects the store's current session.
    async fn settle(&self) {
        let expected = NavState::for_session(&self.gateway.current_session().await);
        let mut nav = self.nav.clone();
        if tokio::time::timeout(SETTLE_TIMEOUT, nav.wait_for(|s| *s == expected)).await.is_err() {
            debug!(?expected, "navigation gate did not settle");
        }
    }

    async fn greeting(&self) -> String {
        match self.gateway.current_session().await {
            Session::Present(identity) => format!("Welcome, {}!", identity.profile.full_name()),
            Session::Absent => "Signed in.".to_owned(),
        }
    }

    async fn whoami(&self) -> String {
        match self.gateway.current_session().await {
            Session::Present(identity) => {
                let p = &identity.profile;
                format!("{} <{}> student {}", p.full_name(), p.email, p.student_id)
            }
            Session::Absent => "Not signed in.".to_owned(),
        }
    }

    async fn update_name(&self, first_name: String, last_name: String) -> String {
        let Session::Present(identity) = self.gateway.current_session().await else {
            return "Not signed in.".to_owned();
        };
        let profile = Profile { first_name, last_name, ..identity.profile.clone() };
        match self.gateway.update_profile(profile).await {
            Ok(()) => "Profile updated.".to_owned(),
            Err(_) => "Profile update failed.".to_owned(),
        }
    }

    async fn buses(&self) -> String {
        let mut out = String::new();
        for bus in self.fleet.buses().await {
            let route = self.fleet.route(bus.route_id).map_or_else(|| "Unknown Route".to_owned(), |r| r.name);
            let _ = writeln!(
                out,
                "{:>2} {} {:<12} {:?} {}/{} ({:.0}%) next: {}",
                bus.id,
                bus.bus_number,
                route,
                bus.status,
                bus.current_passengers,
                bus.capacity,
                bus.occupancy_percentage(),
                if bus.next_stop.is_empty() { "N/A" } else { bus.next_stop.as_str() },
            );
        }
        out.trim_end().to_owned()
    }

    fn routes(&self) -> String {
        let mut out = String::new();
        for route in self.fleet.routes() {
            let _ = writeln!(
                out,
                "{} {} every {} min, {:02}:{:02}-{:02}:{:02}",
                route.id,
                route.name,
                route.frequency_minutes,
                route.first_departure.hour(),
                route.first_departure.minute(),
                route.last_departure.hour(),
                route.last_departure.minute(),
            );
            for stop in self.fleet.stops(route.id) {
                let _ = writeln!(out, "   {}. {} (stop {})", stop.order, stop.name, stop.id);
            }
        }
        out.trim_end().to_owned()
    }

    async fn map(&self) -> String {
        let mut out = String::new();
        for bus in self.fleet.buses().await {
            let point = self.viewport.project(bus.latitude, bus.longitude);
            let edge = if self.viewport.contains(bus.latitude, bus.longitude) { "" } else { " (off map)" };
            let _ = writeln!(out, "{} at ({:.0}, {:.0}){edge}", bus.bus_number, point.x, point.y);
        }
        out.trim_end().to_owned()
    }

    async fn inbox(&self) -> String {
        let items = self.notifications.all().await;
        if items.is_empty() {
            return "No notifications.".to_owned();
        }
        let mut out = String::new();
        for (i, n) in items.iter().enumerate() {
            let marker = if n.read { ' ' } else { '*' };
            let _ = writeln!(out, "{marker}{:>2}. [{}] {}: {}", i + 1, n.kind.display_name(), n.title, n.message);
        }
        let _ = write!(out, "{} unread", self.notifications.unread_count().await);
        out
    }

    async fn read(&self, target: Option<usize>) -> String {
        let Some(n) = target else {
            self.notifications.mark_all_read().await;
            return "All notifications read.".to_owned();
        };
        match self.nth_notification(n).await {
            Some(id) if self.notifications.mark_read(id).await => format!("Marked {n} read."),
            Some(_) => format!("{n} was already read."),
            None => format!("No notification {n}."),
        }
    }

    async fn delete(&self, n: usize) -> String {
        match self.nth_notification(n).await {
            Some(id) if self.notifications.delete(id).await => format!("Deleted {n}."),
            _ => format!("No notification {n}."),
        }
    }

    async fn nth_notification(&self, n: usize) -> Option<uuid::Uuid> {
        let index = n.checked_sub(1)?;
        self.notifications.all().await.get(index).map(|item| item.id)
    }
}

#[cfg(test)]
#[path = "shell_test.rs"]
mod tests;
