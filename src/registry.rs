use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};
use crate::model::{Member, MemberId, MemberStatus, Registration};
use crate::store::Store;

/// Registration and admin review of association members.
///
/// The engine never writes members; it only reads eligibility through
/// [`MemberDirectory`](crate::store::MemberDirectory).
#[derive(Clone)]
pub struct MemberRegistry {
    store: Arc<dyn Store>,
}

impl MemberRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Record a new pending registration.
    pub async fn register(
        &self,
        member_id: MemberId,
        registration: Registration,
        now: DateTime<Utc>,
    ) -> Result<Member> {
        let name = registration.name.trim();
        if name.is_empty() {
            return Err(Error::BadRequest("name must not be empty".to_string()));
        }

        let member = Member::new(member_id, name, now);
        if !self.store.insert_member(&member).await? {
            return Err(Error::BadRequest(format!(
                "Member {member_id} is already registered"
            )));
        }
        info!("Member {member_id} registered, awaiting review");
        Ok(member)
    }

    pub async fn get(&self, member_id: MemberId) -> Result<Member> {
        self.store
            .member(member_id)
            .await?
            .ok_or_else(|| Error::not_found(format!("Member {member_id}")))
    }

    /// Approve a pending or previously rejected member, making them eligible.
    pub async fn approve(&self, member_id: MemberId, now: DateTime<Utc>) -> Result<Member> {
        let mut member = self.get(member_id).await?;
        if member.status == MemberStatus::Approved {
            return Ok(member);
        }
        member.status = MemberStatus::Approved;
        member.eligible = true;
        member.decided_at = Some(now);
        self.store.replace_member(&member).await?;
        info!("Member {member_id} approved");
        Ok(member)
    }

    /// Reject a pending registration. Approved members are deactivated instead.
    pub async fn reject(&self, member_id: MemberId, now: DateTime<Utc>) -> Result<Member> {
        let mut member = self.get(member_id).await?;
        match member.status {
            MemberStatus::Rejected => return Ok(member),
            MemberStatus::Approved => {
                return Err(Error::BadRequest(format!(
                    "Member {member_id} is approved; deactivate them instead"
                )))
            }
            MemberStatus::Pending => {}
        }
        member.status = MemberStatus::Rejected;
        member.eligible = false;
        member.decided_at = Some(now);
        self.store.replace_member(&member).await?;
        info!("Member {member_id} rejected");
        Ok(member)
    }

    /// Temporarily withdraw an approved member's right to vote.
    pub async fn deactivate(&self, member_id: MemberId) -> Result<Member> {
        self.set_eligible(member_id, false).await
    }

    /// Restore a deactivated member's right to vote.
    pub async fn reactivate(&self, member_id: MemberId) -> Result<Member> {
        self.set_eligible(member_id, true).await
    }

    async fn set_eligible(&self, member_id: MemberId, eligible: bool) -> Result<Member> {
        let mut member = self.get(member_id).await?;
        if member.status != MemberStatus::Approved {
            return Err(Error::BadRequest(format!(
                "Member {member_id} is {} and has no voting rights to change",
                member.status
            )));
        }
        if member.eligible == eligible {
            return Ok(member);
        }
        member.eligible = eligible;
        self.store.replace_member(&member).await?;
        if eligible {
            info!("Member {member_id} reactivated");
        } else {
            info!("Member {member_id} deactivated");
        }
        Ok(member)
    }
}
