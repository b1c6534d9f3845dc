pub mod config;
pub mod db;
pub mod doctor;
pub mod error;
pub mod models;
pub mod service;
pub mod session;
pub mod utils;

pub use config::Config;
pub use db::Database;
pub use error::{ForumError, Result};
pub use models::{
    Answer, AnswerId, NewQuestion, Notification, NotificationId, NotificationKind, Profile,
    Question, QuestionBuilder, QuestionId, Tag, TagId, UserId, Vote, VoteChange, VoteId,
    VoteOutcome, VoteTarget, VoteType, normalize_tag,
};
pub use service::{
    CounterAudit, CounterDrift, CounterKind, ForumService, ListQuestionsOptions, QuestionOrder,
};
pub use session::{AuthState, Authenticator, Session, Subscription};
