//! Ordered boot phases with status tracking.

use crate::kernel::status::{register_component, update_component_status, InitStatus};

pub type PhaseFn = fn() -> Result<(), &'static str>;

/// One named step of kernel bring-up.
#[derive(Clone, Copy)]
pub struct Phase {
    pub name: &'static str,
    pub run: PhaseFn,
}

impl Phase {
    pub const fn new(name: &'static str, run: PhaseFn) -> Self {
        Self { name, run }
    }
}

/// Runs `phases` in order and stops at the first failure.
pub fn init_kernel(phases: &[Phase]) -> Result<(), &'static str> {
    for phase in phases {
        register_component(phase.name);
    }
    log::info!("kernel initialization: {} phases", phases.len());

    for (step, phase) in phases.iter().enumerate() {
        init_phase(step + 1, phases.len(), phase)?;
    }

    log::info!("kernel initialization complete");
    Ok(())
}

fn init_phase(step: usize, total: usize, phase: &Phase) -> Result<(), &'static str> {
    update_component_status(phase.name, InitStatus::InProgress);
    log::info!("[{}/{}] initializing {}", step, total, phase.name);

    match (phase.run)() {
        Ok(()) => {
            update_component_status(phase.name, InitStatus::Completed);
            log::debug!("{} initialized", phase.name);
            Ok(())
        }
        Err(e) => {
            update_component_status(phase.name, InitStatus::Failed(e));
            log::error!("{} failed: {}", phase.name, e);
            Err(e)
        }
    }
}
