pub mod dashboard;
pub mod enums;
pub mod referral;
pub mod user;

pub use dashboard::*;
pub use enums::*;
pub use referral::*;
pub use user::*;
