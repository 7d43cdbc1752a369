// core/src/referral.rs

//! The three-tier referral graph: sponsor resolution, link planning and the
//! read-side views (ancestor chain, team).

use crate::config::PropagationMode;
use crate::error::{CoreError, CoreResult};
use crate::models::{Tier, User, UserSummary};
use crate::store::{derive_links, IdentityStore, ReferralLinkPlan};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

/// Result of attaching a member to a sponsor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferralLink {
  pub member_id: Uuid,
  pub sponsor_id: Uuid,
  pub stage2_ancestor_id: Option<Uuid>,
  pub stage3_ancestor_id: Option<Uuid>,
}

impl From<&ReferralLinkPlan> for ReferralLink {
  fn from(plan: &ReferralLinkPlan) -> Self {
    ReferralLink {
      member_id: plan.member_id,
      sponsor_id: plan.sponsor_id,
      stage2_ancestor_id: plan.stage2_ancestor_id,
      stage3_ancestor_id: plan.stage3_ancestor_id,
    }
  }
}

/// Up to three levels above a user, derived from `sponsor_id` on read.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AncestorChain {
  pub user_id: Uuid,
  pub sponsor: Option<UserSummary>,
  pub stage2: Option<UserSummary>,
  pub stage3: Option<UserSummary>,
}

/// Members recorded in a user's three referral lists.
#[derive(Debug, Clone, Serialize, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct TeamView {
  pub direct: Vec<UserSummary>,
  pub stage2: Vec<UserSummary>,
  pub stage3: Vec<UserSummary>,
}

impl TeamView {
  pub fn size(&self) -> usize {
    self.direct.len() + self.stage2.len() + self.stage3.len()
  }
}

#[derive(Clone)]
pub struct ReferralGraph {
  store: Arc<dyn IdentityStore>,
  mode: PropagationMode,
}

impl std::fmt::Debug for ReferralGraph {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("ReferralGraph").field("mode", &self.mode).finish()
  }
}

impl ReferralGraph {
  pub fn new(store: Arc<dyn IdentityStore>, mode: PropagationMode) -> Self {
    Self { store, mode }
  }

  pub fn mode(&self) -> PropagationMode {
    self.mode
  }

  pub async fn resolve_sponsor(&self, code: &str) -> CoreResult<User> {
    self
      .store
      .find_by_referral_code(code.trim())
      .await?
      .ok_or_else(|| CoreError::InvalidReferralCode(code.to_string()))
  }

  /// Computes the ancestor writes for attaching `member_id` below `sponsor`.
  /// Stores re-derive the same plan under their row locks when applying it.
  pub async fn plan_for(&self, member_id: Uuid, sponsor: &User) -> CoreResult<ReferralLinkPlan> {
    let mut plan = ReferralLinkPlan::new(member_id, sponsor.id, self.mode);
    let stage2 = match self.mode {
      PropagationMode::SponsorChain => self.sponsor_of(sponsor).await?,
      PropagationMode::Literal => None,
    };
    // Unknown during registration; present when an existing member is linked.
    let member = self.store.find_by_id(member_id).await?;
    derive_links(&mut plan, sponsor, stage2.as_ref(), member.as_ref())?;

    debug!(%member_id, sponsor_id = %sponsor.id, links = plan.links.len(), mode = ?self.mode, "Referral links planned.");
    Ok(plan)
  }

  pub async fn plan(&self, member_id: Uuid, code: &str) -> CoreResult<ReferralLinkPlan> {
    let sponsor = self.resolve_sponsor(code).await?;
    self.plan_for(member_id, &sponsor).await
  }

  /// Attaches an already promoted member that has no sponsor yet.
  #[instrument(name = "referral::link", skip(self))]
  pub async fn link_referral(&self, member_id: Uuid, code: &str) -> CoreResult<ReferralLink> {
    let member = self
      .store
      .find_by_id(member_id)
      .await?
      .ok_or_else(|| CoreError::UserNotFound(member_id.to_string()))?;
    if member.sponsor_id.is_some() {
      return Err(CoreError::AlreadyLinked(member_id));
    }

    let sponsor = self.resolve_sponsor(code).await?;
    self.ensure_not_descendant(member_id, &sponsor).await?;

    let mut plan = self.plan_for(member_id, &sponsor).await?;
    self.store.apply_links(&mut plan).await?;
    info!(%member_id, sponsor_id = %sponsor.id, moved = plan.links.len(), "Existing member linked to sponsor.");
    Ok(ReferralLink::from(&plan))
  }

  pub async fn ancestors(&self, user_id: Uuid) -> CoreResult<AncestorChain> {
    let user = self.user(user_id).await?;
    let sponsor = self.sponsor_of(&user).await?;
    let stage2 = match &sponsor {
      Some(s) => self.sponsor_of(s).await?,
      None => None,
    };
    let stage3 = match &stage2 {
      Some(s) => self.sponsor_of(s).await?,
      None => None,
    };
    Ok(AncestorChain {
      user_id,
      sponsor: sponsor.map(|u| u.summary()),
      stage2: stage2.map(|u| u.summary()),
      stage3: stage3.map(|u| u.summary()),
    })
  }

  pub async fn team(&self, user_id: Uuid) -> CoreResult<TeamView> {
    let user = self.user(user_id).await?;
    let mut view = TeamView::default();
    for tier in Tier::ALL {
      let members: Vec<UserSummary> = self
        .store
        .find_many(user.referrals(tier))
        .await?
        .iter()
        .map(User::summary)
        .collect();
      match tier {
        Tier::Direct => view.direct = members,
        Tier::Stage2 => view.stage2 = members,
        Tier::Stage3 => view.stage3 = members,
      }
    }
    Ok(view)
  }

  async fn user(&self, id: Uuid) -> CoreResult<User> {
    self
      .store
      .find_by_id(id)
      .await?
      .ok_or_else(|| CoreError::UserNotFound(id.to_string()))
  }

  async fn sponsor_of(&self, user: &User) -> CoreResult<Option<User>> {
    match user.sponsor_id {
      Some(id) => self.store.find_by_id(id).await,
      None => Ok(None),
    }
  }

  /// Walks up from `sponsor`; reaching `member_id` means the link would close a cycle.
  async fn ensure_not_descendant(&self, member_id: Uuid, sponsor: &User) -> CoreResult<()> {
    let cycle = CoreError::ReferralCycle {
      member: member_id,
      sponsor: sponsor.id,
    };
    let mut seen = HashSet::new();
    let mut cursor = Some(sponsor.clone());
    while let Some(node) = cursor {
      if node.id == member_id || !seen.insert(node.id) {
        return Err(cycle);
      }
      cursor = self.sponsor_of(&node).await?;
    }
    Ok(())
  }
}
