//! Domain models for the session workflow

pub mod attendance;
pub mod class;
pub mod credential;
pub mod payment;
pub mod session;
pub mod tutor;

// Re-export for convenience
pub use attendance::{Attendance, AttendanceCorrection, AttendanceStatus};
pub use class::{Class, ClassMember};
pub use credential::{CheckInCredential, CheckInMethod};
pub use payment::{LedgerCredit, Transaction, TransactionStatus};
pub use session::{NewSession, Session, SessionStatus, SessionUpdate};
pub use tutor::{Consortium, ConsortiumMember, TutorProfile};
