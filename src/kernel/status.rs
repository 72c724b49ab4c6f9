use alloc::vec::Vec;
use core::fmt;

use spin::Mutex;

/// Boot progress of one kernel component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitStatus {
    NotStarted,
    InProgress,
    Completed,
    Failed(&'static str),
}

#[derive(Debug, Clone, Copy)]
pub struct ComponentStatus {
    pub name: &'static str,
    pub status: InitStatus,
}

impl ComponentStatus {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            status: InitStatus::NotStarted,
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, InitStatus::Failed(_))
    }
}

/// Components in registration order.
#[derive(Debug, Default)]
pub struct StatusBoard {
    components: Vec<ComponentStatus>,
}

impl StatusBoard {
    pub const fn new() -> Self {
        Self {
            components: Vec::new(),
        }
    }

    /// Registering a name twice keeps the first entry.
    pub fn register(&mut self, name: &'static str) {
        if self.get(name).is_none() {
            self.components.push(ComponentStatus::new(name));
        }
    }

    pub fn update(&mut self, name: &'static str, status: InitStatus) {
        if let Some(comp) = self.components.iter_mut().find(|c| c.name == name) {
            comp.status = status;
        }
    }

    pub fn get(&self, name: &str) -> Option<&ComponentStatus> {
        self.components.iter().find(|c| c.name == name)
    }

    pub fn statuses(&self) -> &[ComponentStatus] {
        &self.components
    }
}

static INIT_STATUS: Mutex<StatusBoard> = Mutex::new(StatusBoard::new());

pub fn register_component(name: &'static str) {
    INIT_STATUS.lock().register(name);
}

pub fn update_component_status(name: &'static str, status: InitStatus) {
    INIT_STATUS.lock().update(name, status);
}

pub fn get_all_statuses() -> Vec<ComponentStatus> {
    INIT_STATUS.lock().statuses().to_vec()
}

impl fmt::Display for InitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InitStatus::NotStarted => write!(f, "Not Started"),
            InitStatus::InProgress => write!(f, "In Progress"),
            InitStatus::Completed => write!(f, "Completed"),
            InitStatus::Failed(err) => write!(f, "Failed: {}", err),
        }
    }
}
