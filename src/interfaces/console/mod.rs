//! Text-command console: one `<sender-id> <message>` per line, the way the
//! messaging front-end hands messages to the core.

pub mod command;
pub mod dispatcher;
pub mod form;
pub mod script;

pub use command::Command;
pub use dispatcher::{AdminAllowList, Console, Reply};
pub use form::SignupForm;
pub use script::{ScriptLine, ScriptReader};
