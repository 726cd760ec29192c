pub mod environment;
pub mod model;
pub mod session;
pub mod timer;
pub mod violations;

pub use environment::{EnvEvent, EnvSubscription, EnvironmentAdapter, SimulatedEnvironment};
pub use model::{AnswerSet, ExamSession, Question, Role, Route, SubmissionReceipt};
pub use session::{
    ProctoringSession, SessionEffect, SessionInput, SessionSnapshot, SessionStatus, UiUpdate,
};
