//! Variables every console session starts with.

use seg_core::app::Application;
use seg_core::state::{StateError, StateHandler, StateVariable};

pub const TOOLS: &[&str] = &["none", "paint", "threshold", "grow", "measure"];

/// Register the `session` handler: display settings plus the active tool.
pub fn seed(app: &Application) -> Result<StateHandler, StateError> {
    let session = StateHandler::new(app.state(), "session", false)?;
    session.add(
        StateVariable::new("brightness", 50.0)
            .with_range(0.0, 100.0)
            .with_project_data(true),
    )?;
    session.add(
        StateVariable::new("contrast", 50.0)
            .with_range(0.0, 100.0)
            .with_project_data(true),
    )?;
    session.add(
        StateVariable::option("active_tool", "none", TOOLS).with_project_data(true),
    )?;
    session.add(StateVariable::new("label", "untitled").with_project_data(true))?;
    Ok(session)
}
