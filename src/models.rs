mod answer;
mod ids;
mod notification;
mod profile;
mod question;
mod tag;
mod vote;

pub use answer::{Answer, answer_display_order, validate_answer_content};
pub use ids::{AnswerId, NotificationId, QuestionId, TagId, UserId, VoteId};
pub use notification::{Notification, NotificationKind};
pub use profile::{Profile, validate_username};
pub use question::{NewQuestion, Question, QuestionBuilder};
pub use tag::{TAG_PALETTE, Tag, normalize_tag, palette_color};
pub use vote::{Vote, VoteChange, VoteOutcome, VoteTarget, VoteType};
