use mongodb::{
    bson::{doc, to_bson},
    options::FindOptions,
    Client, Database,
};
use rocket::futures::TryStreamExt;

use crate::error::Result;
use crate::model::{
    mongodb::{
        ensure_indexes_exist, ensure_vote_id_counter_exists, is_duplicate_key_error, Coll,
        Counter, VOTE_ID_COUNTER_ID,
    },
    Ballot, Member, MemberId, MemberStatus, Reminder, Vote, VoteId, VoteState,
};

use super::{MemberDirectory, Store};

/// A store backed by a MongoDB database.
#[derive(Clone)]
pub struct MongoStore {
    db: Database,
}

impl MongoStore {
    /// Connect, then make sure indexes and the vote ID counter exist.
    pub async fn connect(uri: &str, db_name: &str) -> Result<Self> {
        let client = Client::with_uri_str(uri).await?;
        Self::open(client.database(db_name)).await
    }

    /// Prepare an already-connected database.
    pub async fn open(db: Database) -> Result<Self> {
        ensure_indexes_exist(&db).await?;
        ensure_vote_id_counter_exists(&Coll::from_db(&db)).await?;
        Ok(Self { db })
    }

    fn members(&self) -> Coll<Member> {
        Coll::from_db(&self.db)
    }

    fn votes(&self) -> Coll<Vote> {
        Coll::from_db(&self.db)
    }

    fn ballots(&self) -> Coll<Ballot> {
        Coll::from_db(&self.db)
    }

    fn reminders(&self) -> Coll<Reminder> {
        Coll::from_db(&self.db)
    }

    fn counters(&self) -> Coll<Counter> {
        Coll::from_db(&self.db)
    }
}

#[rocket::async_trait]
impl MemberDirectory for MongoStore {
    async fn is_approved_and_eligible(&self, member_id: MemberId) -> Result<bool> {
        let filter = doc! {
            "_id": member_id,
            "status": MemberStatus::Approved,
            "eligible": true,
        };
        Ok(self.members().count_documents(filter, None).await? > 0)
    }

    async fn count_eligible_members(&self) -> Result<u64> {
        let filter = doc! {
            "status": MemberStatus::Approved,
            "eligible": true,
        };
        Ok(self.members().count_documents(filter, None).await?)
    }

    async fn eligible_members(&self) -> Result<Vec<MemberId>> {
        let filter = doc! {
            "status": MemberStatus::Approved,
            "eligible": true,
        };
        let members: Vec<Member> = self
            .members()
            .find(filter, None)
            .await?
            .try_collect()
            .await?;
        Ok(members.into_iter().map(|member| member.id).collect())
    }
}

#[rocket::async_trait]
impl Store for MongoStore {
    async fn insert_member(&self, member: &Member) -> Result<bool> {
        match self.members().insert_one(member, None).await {
            Ok(_) => Ok(true),
            Err(err) if is_duplicate_key_error(&err) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    async fn member(&self, member_id: MemberId) -> Result<Option<Member>> {
        Ok(self
            .members()
            .find_one(doc! {"_id": member_id}, None)
            .await?)
    }

    async fn replace_member(&self, member: &Member) -> Result<()> {
        self.members()
            .replace_one(doc! {"_id": member.id}, member, None)
            .await?;
        Ok(())
    }

    async fn next_vote_id(&self) -> Result<VoteId> {
        Counter::next(&self.counters(), VOTE_ID_COUNTER_ID).await
    }

    async fn insert_vote(&self, vote: &Vote) -> Result<()> {
        self.votes().insert_one(vote, None).await?;
        Ok(())
    }

    async fn vote(&self, vote_id: VoteId) -> Result<Option<Vote>> {
        Ok(self.votes().find_one(doc! {"_id": vote_id}, None).await?)
    }

    async fn votes(&self, state: Option<VoteState>) -> Result<Vec<Vote>> {
        let filter = state.map(|state| doc! {"state": state});
        let options = FindOptions::builder().sort(doc! {"_id": 1}).build();
        Ok(self
            .votes()
            .find(filter, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn replace_vote_if(&self, vote: &Vote, expected: VoteState) -> Result<bool> {
        let filter = doc! {
            "_id": vote.id,
            "state": expected,
        };
        let result = self.votes().replace_one(filter, vote, None).await?;
        Ok(result.matched_count == 1)
    }

    async fn mark_exported(&self, vote_id: VoteId) -> Result<bool> {
        let filter = doc! {
            "_id": vote_id,
            "state": VoteState::Closed,
            "exported": false,
        };
        let update = doc! {"$set": {"exported": true}};
        let result = self.votes().update_one(filter, update, None).await?;
        Ok(result.modified_count == 1)
    }

    async fn delete_vote(&self, vote_id: VoteId) -> Result<()> {
        self.ballots()
            .delete_many(doc! {"vote_id": vote_id}, None)
            .await?;
        self.reminders()
            .delete_one(doc! {"_id": vote_id}, None)
            .await?;
        self.votes().delete_one(doc! {"_id": vote_id}, None).await?;
        Ok(())
    }

    async fn upsert_ballot(&self, ballot: &Ballot) -> Result<Option<Ballot>> {
        let key = doc! {
            "vote_id": ballot.vote_id,
            "member_id": ballot.member_id,
        };
        loop {
            match self.ballots().find_one(key.clone(), None).await? {
                Some(stored) if stored.cast_at > ballot.cast_at => return Ok(Some(stored)),
                Some(stored) => {
                    // Replace only the row we compared against.
                    let mut filter = key.clone();
                    filter.insert(
                        "cast_at",
                        to_bson(&stored.cast_at).expect("Serialisation is infallible"),
                    );
                    let result = self.ballots().replace_one(filter, ballot, None).await?;
                    if result.matched_count == 1 {
                        return Ok(Some(stored));
                    }
                }
                None => match self.ballots().insert_one(ballot, None).await {
                    Ok(_) => return Ok(None),
                    // Two first ballots raced to insert; compare against the winner.
                    Err(err) if is_duplicate_key_error(&err) => {}
                    Err(err) => return Err(err.into()),
                },
            }
            debug!(
                "Ballot of member {} in vote {} changed underneath, retrying",
                ballot.member_id, ballot.vote_id
            );
        }
    }

    async fn ballots(&self, vote_id: VoteId) -> Result<Vec<Ballot>> {
        let options = FindOptions::builder().sort(doc! {"member_id": 1}).build();
        Ok(self
            .ballots()
            .find(doc! {"vote_id": vote_id}, options)
            .await?
            .try_collect()
            .await?)
    }

    async fn insert_reminder(&self, reminder: &Reminder) -> Result<()> {
        match self.reminders().insert_one(reminder, None).await {
            Ok(_) => Ok(()),
            Err(err) if is_duplicate_key_error(&err) => Ok(()),
            Err(err) => Err(err.into()),
        }
    }

    async fn reminder(&self, vote_id: VoteId) -> Result<Option<Reminder>> {
        Ok(self
            .reminders()
            .find_one(doc! {"_id": vote_id}, None)
            .await?)
    }

    async fn mark_reminder_fired(&self, vote_id: VoteId) -> Result<bool> {
        let filter = doc! {
            "_id": vote_id,
            "fired": false,
        };
        let update = doc! {"$set": {"fired": true}};
        let result = self.reminders().update_one(filter, update, None).await?;
        Ok(result.modified_count == 1)
    }
}
