use std::collections::BTreeMap;

use serde::Serialize;
use tracing::info;

use crate::constants::GHOSTS_PER_PACMAN;
use crate::error::LobbyError;
use crate::types::{Role, SessionId};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LobbyMember {
    pub session_id: SessionId,
    pub role: Option<Role>,
    #[serde(skip)]
    pub role_chosen_ms: Option<u64>,
}

/// What one lobby connection is shown. `can_select_*` is already resolved
/// against the recipient's own state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LobbyView {
    pub lobby: Vec<LobbyMember>,
    pub roles_taken: BTreeMap<&'static str, usize>,
    pub session_id: SessionId,
    pub can_select_pacman: bool,
    pub can_select_ghost: bool,
}

/// Pre-game registry of sessions and the roles they picked, in join order.
#[derive(Clone, Debug, Default)]
pub struct Lobby {
    members: Vec<LobbyMember>,
}

impl Lobby {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, session_id: SessionId) {
        if self.member(&session_id).is_some() {
            return;
        }
        info!(session = %session_id, "lobby member registered");
        self.members.push(LobbyMember {
            session_id,
            role: None,
            role_chosen_ms: None,
        });
    }

    pub fn remove(&mut self, session_id: &SessionId) -> Option<LobbyMember> {
        let idx = self
            .members
            .iter()
            .position(|member| &member.session_id == session_id)?;
        Some(self.members.remove(idx))
    }

    pub fn role_of(&self, session_id: &SessionId) -> Option<Role> {
        self.member(session_id).and_then(|member| member.role)
    }

    pub fn members(&self) -> &[LobbyMember] {
        &self.members
    }

    pub fn count(&self, role: Role) -> usize {
        self.members
            .iter()
            .filter(|member| member.role == Some(role))
            .count()
    }

    /// Ghost is always open. Pac-Man needs the ghost count to keep covering
    /// `GHOSTS_PER_PACMAN` per Pac-Man once the new one is added, except for
    /// the very first Pac-Man.
    pub fn is_role_available(&self, role: Role) -> bool {
        match role {
            Role::Ghost => true,
            Role::PacMan => {
                let pacmen = self.count(Role::PacMan);
                pacmen == 0 || self.count(Role::Ghost) >= GHOSTS_PER_PACMAN * (pacmen + 1)
            }
        }
    }

    pub fn select_role(
        &mut self,
        session_id: &SessionId,
        role: Role,
        now_ms: u64,
    ) -> Result<(), LobbyError> {
        let current = self
            .member(session_id)
            .ok_or_else(|| LobbyError::UnknownSession(session_id.clone()))?
            .role;
        if let Some(chosen) = current {
            return Err(LobbyError::RoleAlreadyChosen(chosen));
        }
        if !self.is_role_available(role) {
            return Err(LobbyError::RoleUnavailable(role));
        }

        if let Some(member) = self
            .members
            .iter_mut()
            .find(|member| &member.session_id == session_id)
        {
            member.role = Some(role);
            member.role_chosen_ms = Some(now_ms);
        }
        info!(session = %session_id, %role, "lobby role selected");
        Ok(())
    }

    /// Drops members that picked a role at least `grace_ms` ago and are not
    /// held by `in_use`. Returns the sessions that were dropped.
    pub fn expire_unclaimed(
        &mut self,
        now_ms: u64,
        grace_ms: u64,
        in_use: impl Fn(&SessionId) -> bool,
    ) -> Vec<SessionId> {
        let mut expired = Vec::new();
        self.members.retain(|member| {
            let stale = member
                .role_chosen_ms
                .is_some_and(|chosen| now_ms.saturating_sub(chosen) >= grace_ms);
            if stale && !in_use(&member.session_id) {
                expired.push(member.session_id.clone());
                return false;
            }
            true
        });
        for session in &expired {
            info!(%session, "unclaimed lobby role expired");
        }
        expired
    }

    pub fn view_for(&self, session_id: &SessionId) -> LobbyView {
        let undecided = self
            .member(session_id)
            .is_some_and(|member| member.role.is_none());
        let roles_taken = [Role::PacMan, Role::Ghost]
            .into_iter()
            .map(|role| (role.label(), self.count(role)))
            .collect();

        LobbyView {
            lobby: self.members.clone(),
            roles_taken,
            session_id: session_id.clone(),
            can_select_pacman: undecided && self.is_role_available(Role::PacMan),
            can_select_ghost: undecided && self.is_role_available(Role::Ghost),
        }
    }

    fn member(&self, session_id: &SessionId) -> Option<&LobbyMember> {
        self.members
            .iter()
            .find(|member| &member.session_id == session_id)
    }
}
