use mongodb::{
    bson::doc,
    error::Error as DbError,
    options::{FindOneAndUpdateOptions, ReturnDocument, UpdateOptions},
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::mongodb::Coll;

/// ID of the counter vote IDs are drawn from.
pub const VOTE_ID_COUNTER_ID: &str = "vote_id";

/// A counter object used to implement auto-increment fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Counter {
    #[serde(rename = "_id")]
    pub id: String,
    pub next: u32,
}

impl Counter {
    /// Atomically retrieve the next value of the counter with the given ID.
    pub async fn next(counters: &Coll<Counter>, id: &str) -> Result<u32> {
        let update = doc! {
            "$inc": { "next": 1 }
        };
        let options = FindOneAndUpdateOptions::builder()
            .return_document(ReturnDocument::Before)
            .build();
        let counter = counters
            .find_one_and_update(doc! {"_id": id}, update, options)
            .await?
            .ok_or_else(|| Error::NotFound(format!("counter `{id}`")))?;
        Ok(counter.next)
    }
}

/// Create the vote ID counter, starting at 1, unless it already exists.
pub async fn ensure_vote_id_counter_exists(
    counters: &Coll<Counter>,
) -> std::result::Result<(), DbError> {
    let options = UpdateOptions::builder().upsert(true).build();
    counters
        .update_one(
            doc! {"_id": VOTE_ID_COUNTER_ID},
            doc! {"$setOnInsert": {"next": 1}},
            options,
        )
        .await?;
    Ok(())
}
