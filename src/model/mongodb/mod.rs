mod collection;
mod counter;
mod errors;

pub use collection::{ensure_indexes_exist, Coll, MongoCollection};
pub use counter::{ensure_vote_id_counter_exists, Counter, VOTE_ID_COUNTER_ID};
pub use errors::is_duplicate_key_error;
