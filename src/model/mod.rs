pub mod ad;
pub mod ad_event;
pub mod adapters;
pub mod creative_ad;
pub mod history_item;
pub mod subdivision;
pub mod user_model;

pub use ad::Ad;
pub use ad_event::{AdEvent, ConfirmationType};
pub use creative_ad::{AdType, CreativeAd, CreativeDaypart};
pub use history_item::{AdContent, CategoryContent, HistoryItem, ReactionType, Reactions};
pub use subdivision::{SubdivisionSelection, SubdivisionSettings};
pub use user_model::{TextEmbeddingEvent, UserModel};
