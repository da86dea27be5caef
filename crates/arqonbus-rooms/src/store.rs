use dashmap::DashMap;

use crate::error::{Error, Result};

type RoomKey = (String, String);
type ChannelKey = (String, String, String);

struct RoomState {
    created_at: u64,
    /// Channel names created within this room. The room is derived: it has
    /// no members of its own and is removed once this set is empty.
    channels: Vec<String>,
}

struct ChannelState {
    creator: String,
    created_at: u64,
    description: Option<String>,
    /// Ordered by join time; membership checks are linear, which is fine at
    /// the per-channel scale this store targets.
    members: Vec<String>,
}

/// A read-only snapshot of a channel's metadata and membership.
#[derive(Debug, Clone)]
pub struct ChannelInfo {
    pub tenant_id: String,
    pub room: String,
    pub channel: String,
    pub creator: String,
    pub created_at: u64,
    pub description: Option<String>,
    pub members: Vec<String>,
}

/// Authoritative rooms/channels membership ledger, partitioned by
/// `(tenant_id, room[, channel])` (§4.3).
///
/// Every public method takes an explicit `tenant_id` and never infers it;
/// callers (the command executor) are responsible for deriving `tenant_id`
/// from the authenticated principal so that no operation can cross a
/// tenant boundary by construction.
pub struct RoomsStore {
    rooms: DashMap<RoomKey, RoomState>,
    channels: DashMap<ChannelKey, ChannelState>,
    auto_create_default: bool,
    auto_create_opt_out: std::collections::HashSet<String>,
}

impl RoomsStore {
    #[must_use]
    pub fn new(auto_create_default: bool, auto_create_opt_out: Vec<String>) -> Self {
        Self {
            rooms: DashMap::new(),
            channels: DashMap::new(),
            auto_create_default,
            auto_create_opt_out: auto_create_opt_out.into_iter().collect(),
        }
    }

    fn auto_create_allowed(&self, tenant_id: &str) -> bool {
        self.auto_create_default && !self.auto_create_opt_out.contains(tenant_id)
    }

    /// Explicitly create a channel (and its room, if new). Fails if the
    /// channel already exists.
    pub fn create_channel(
        &self,
        tenant_id: &str,
        room: &str,
        channel: &str,
        creator: &str,
        description: Option<String>,
    ) -> Result<()> {
        let ckey = (tenant_id.to_string(), room.to_string(), channel.to_string());
        if self.channels.contains_key(&ckey) {
            return Err(Error::ChannelAlreadyExists {
                tenant_id: tenant_id.to_string(),
                room: room.to_string(),
                channel: channel.to_string(),
            });
        }
        let now = arqonbus_common::time::now_ms();
        self.channels.insert(ckey, ChannelState {
            creator: creator.to_string(),
            created_at: now,
            description,
            members: Vec::new(),
        });
        self.rooms
            .entry((tenant_id.to_string(), room.to_string()))
            .or_insert_with(|| RoomState {
                created_at: now,
                channels: Vec::new(),
            })
            .channels
            .push(channel.to_string());
        Ok(())
    }

    /// Delete a channel (admin-gated by the caller). Removes the room too
    /// if it has no channels left afterward.
    pub fn delete_channel(&self, tenant_id: &str, room: &str, channel: &str) -> Result<()> {
        let ckey = (tenant_id.to_string(), room.to_string(), channel.to_string());
        if self.channels.remove(&ckey).is_none() {
            return Err(Error::ChannelNotFound {
                tenant_id: tenant_id.to_string(),
                room: room.to_string(),
                channel: channel.to_string(),
            });
        }

        let rkey = (tenant_id.to_string(), room.to_string());
        let mut remove_room = false;
        if let Some(mut entry) = self.rooms.get_mut(&rkey) {
            entry.channels.retain(|c| c != channel);
            remove_room = entry.channels.is_empty();
        }
        if remove_room {
            self.rooms.remove(&rkey);
        }
        Ok(())
    }

    /// Join a channel, auto-creating the room/channel on first use if
    /// permitted for this tenant. Idempotent.
    pub fn join_channel(
        &self,
        tenant_id: &str,
        room: &str,
        channel: &str,
        client_id: &str,
    ) -> Result<()> {
        let ckey = (tenant_id.to_string(), room.to_string(), channel.to_string());
        if !self.channels.contains_key(&ckey) {
            if !self.auto_create_allowed(tenant_id) {
                return Err(Error::AutoCreateDisabled {
                    tenant_id: tenant_id.to_string(),
                });
            }
            self.create_channel(tenant_id, room, channel, client_id, None)
                .or_else(|e| match e {
                    Error::ChannelAlreadyExists { .. } => Ok(()),
                    other => Err(other),
                })?;
        }

        let mut entry = self.channels.get_mut(&ckey).ok_or_else(|| Error::ChannelNotFound {
            tenant_id: tenant_id.to_string(),
            room: room.to_string(),
            channel: channel.to_string(),
        })?;
        if !entry.members.iter().any(|m| m == client_id) {
            entry.members.push(client_id.to_string());
        }
        Ok(())
    }

    /// Leave a channel. Idempotent; leaving a channel you are not a member
    /// of, or one that no longer exists, is not an error.
    pub fn leave_channel(&self, tenant_id: &str, room: &str, channel: &str, client_id: &str) {
        let ckey = (tenant_id.to_string(), room.to_string(), channel.to_string());
        if let Some(mut entry) = self.channels.get_mut(&ckey) {
            entry.members.retain(|m| m != client_id);
        }
    }

    /// Remove a client from every channel it belongs to under a tenant.
    /// Called when a session closes, to atomically purge membership before
    /// further broadcasts can observe the stale client_id (§4.2, §4.3).
    pub fn remove_client_everywhere(&self, tenant_id: &str, client_id: &str) {
        for mut entry in self.channels.iter_mut() {
            if entry.key().0 == tenant_id {
                entry.members.retain(|m| m != client_id);
            }
        }
    }

    pub fn channel_members(&self, tenant_id: &str, room: &str, channel: &str) -> Result<Vec<String>> {
        let ckey = (tenant_id.to_string(), room.to_string(), channel.to_string());
        self.channels
            .get(&ckey)
            .map(|e| e.members.clone())
            .ok_or_else(|| Error::ChannelNotFound {
                tenant_id: tenant_id.to_string(),
                room: room.to_string(),
                channel: channel.to_string(),
            })
    }

    /// Union of every channel's members in a room, first-seen order.
    pub fn room_members(&self, tenant_id: &str, room: &str) -> Vec<String> {
        let rkey = (tenant_id.to_string(), room.to_string());
        let Some(room_state) = self.rooms.get(&rkey) else {
            return Vec::new();
        };
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for channel in &room_state.channels {
            let ckey = (tenant_id.to_string(), room.to_string(), channel.clone());
            if let Some(c) = self.channels.get(&ckey) {
                for member in &c.members {
                    if seen.insert(member.clone()) {
                        out.push(member.clone());
                    }
                }
            }
        }
        out
    }

    pub fn channel_info(&self, tenant_id: &str, room: &str, channel: &str) -> Result<ChannelInfo> {
        let ckey = (tenant_id.to_string(), room.to_string(), channel.to_string());
        self.channels
            .get(&ckey)
            .map(|e| ChannelInfo {
                tenant_id: tenant_id.to_string(),
                room: room.to_string(),
                channel: channel.to_string(),
                creator: e.creator.clone(),
                created_at: e.created_at,
                description: e.description.clone(),
                members: e.members.clone(),
            })
            .ok_or_else(|| Error::ChannelNotFound {
                tenant_id: tenant_id.to_string(),
                room: room.to_string(),
                channel: channel.to_string(),
            })
    }

    /// List every channel in a room.
    pub fn list_channels(&self, tenant_id: &str, room: &str) -> Vec<ChannelInfo> {
        let rkey = (tenant_id.to_string(), room.to_string());
        let Some(room_state) = self.rooms.get(&rkey) else {
            return Vec::new();
        };
        room_state
            .channels
            .iter()
            .filter_map(|channel| self.channel_info(tenant_id, room, channel).ok())
            .collect()
    }

    pub fn room_exists(&self, tenant_id: &str, room: &str) -> bool {
        self.rooms.contains_key(&(tenant_id.to_string(), room.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RoomsStore {
        RoomsStore::new(true, Vec::new())
    }

    #[test]
    fn join_auto_creates_room_and_channel() {
        let s = store();
        s.join_channel("t1", "lobby", "general", "alice").unwrap();
        assert!(s.room_exists("t1", "lobby"));
        assert_eq!(s.channel_members("t1", "lobby", "general").unwrap(), vec!["alice"]);
    }

    #[test]
    fn join_is_idempotent() {
        let s = store();
        s.join_channel("t1", "lobby", "general", "alice").unwrap();
        s.join_channel("t1", "lobby", "general", "alice").unwrap();
        assert_eq!(s.channel_members("t1", "lobby", "general").unwrap().len(), 1);
    }

    #[test]
    fn auto_create_opt_out_rejects_join() {
        let s = RoomsStore::new(true, vec!["t1".into()]);
        let err = s.join_channel("t1", "lobby", "general", "alice").unwrap_err();
        assert!(matches!(err, Error::AutoCreateDisabled { .. }));
    }

    #[test]
    fn room_members_is_union_of_channels() {
        let s = store();
        s.join_channel("t1", "lobby", "general", "alice").unwrap();
        s.join_channel("t1", "lobby", "random", "bob").unwrap();
        s.join_channel("t1", "lobby", "random", "alice").unwrap();
        let members = s.room_members("t1", "lobby");
        assert_eq!(members.len(), 2);
        assert!(members.contains(&"alice".to_string()));
        assert!(members.contains(&"bob".to_string()));
    }

    #[test]
    fn delete_last_channel_removes_room() {
        let s = store();
        s.join_channel("t1", "lobby", "general", "alice").unwrap();
        s.delete_channel("t1", "lobby", "general").unwrap();
        assert!(!s.room_exists("t1", "lobby"));
    }

    #[test]
    fn delete_one_of_many_channels_keeps_room() {
        let s = store();
        s.join_channel("t1", "lobby", "general", "alice").unwrap();
        s.join_channel("t1", "lobby", "random", "bob").unwrap();
        s.delete_channel("t1", "lobby", "general").unwrap();
        assert!(s.room_exists("t1", "lobby"));
    }

    #[test]
    fn leave_channel_is_idempotent_and_tolerant_of_missing() {
        let s = store();
        s.leave_channel("t1", "lobby", "general", "ghost");
        s.join_channel("t1", "lobby", "general", "alice").unwrap();
        s.leave_channel("t1", "lobby", "general", "alice");
        s.leave_channel("t1", "lobby", "general", "alice");
        assert!(s.channel_members("t1", "lobby", "general").unwrap().is_empty());
    }

    #[test]
    fn remove_client_everywhere_purges_all_channels() {
        let s = store();
        s.join_channel("t1", "lobby", "general", "alice").unwrap();
        s.join_channel("t1", "other", "misc", "alice").unwrap();
        s.join_channel("t2", "lobby", "general", "alice").unwrap();
        s.remove_client_everywhere("t1", "alice");
        assert!(s.channel_members("t1", "lobby", "general").unwrap().is_empty());
        assert!(s.channel_members("t1", "other", "misc").unwrap().is_empty());
        // different tenant is untouched
        assert_eq!(s.channel_members("t2", "lobby", "general").unwrap(), vec!["alice"]);
    }

    #[test]
    fn tenants_are_fully_isolated() {
        let s = store();
        s.join_channel("t1", "lobby", "general", "alice").unwrap();
        assert!(!s.room_exists("t2", "lobby"));
    }

    #[test]
    fn create_channel_rejects_duplicate() {
        let s = store();
        s.create_channel("t1", "lobby", "general", "alice", None).unwrap();
        let err = s
            .create_channel("t1", "lobby", "general", "bob", None)
            .unwrap_err();
        assert!(matches!(err, Error::ChannelAlreadyExists { .. }));
    }
}
