pub mod answer_key;
pub mod attempt;
pub mod exam;
pub mod question;
pub mod results;
pub mod scan;

pub use attempt::{Answer, AttemptRecord, GradeSource, GradingStatus, Verdict};
pub use exam::{Exam, ExamSettings};
pub use question::{Question, QuestionKind};
pub use scan::ScanResult;
