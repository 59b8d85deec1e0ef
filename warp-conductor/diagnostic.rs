//! Parse and resolution diagnostics accumulate on the [`crate::Conductor`] rather than aborting
//! the whole run — other modules may still load cleanly even if one is malformed.

use warp_chunk::ModuleId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
   Warning,
   Error,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
   pub severity: Severity,
   pub module:   Option<ModuleId>,
   pub message:  String,
}

impl Diagnostic {
   pub fn warning(module: Option<ModuleId>, message: impl Into<String>) -> Self {
      Self {
         severity: Severity::Warning,
         module,
         message: message.into(),
      }
   }

   pub fn error(module: Option<ModuleId>, message: impl Into<String>) -> Self {
      Self {
         severity: Severity::Error,
         module,
         message: message.into(),
      }
   }
}
