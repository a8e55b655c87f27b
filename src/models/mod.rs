mod diet_record;
mod meal_type;
mod snapshot;
mod sync_state;
mod user_id;
mod version_stamp;

pub use diet_record::{DietRecord, MealItem};
pub use meal_type::{Color, MealType};
pub use snapshot::{LocalDiet, RemoteDiet};
pub use sync_state::SyncState;
pub use user_id::is_valid_user_id;
pub use version_stamp::{Baseline, LocalStamp, Origin, RemoteStamp, VersionStamp};
