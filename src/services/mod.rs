//! Service layer orchestrating repositories and external collaborators.

mod session;

pub use session::SessionService;
