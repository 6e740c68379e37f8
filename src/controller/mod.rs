//! Controller module for SSP reconciliation

mod reconciler;

pub use reconciler::{
    desired_status, run_controller, status_up_to_date, ControllerState, SspReconciler,
    CONTROLLER_NAME, PHASE_DEPLOYED,
};
