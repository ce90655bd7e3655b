use std::{
    collections::{HashMap, HashSet},
    fmt,
};

use serde::{Deserialize, Serialize};

use super::{ConnectionId, UserId};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(String);

impl RoomId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for RoomId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl From<String> for RoomId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// A user's personal room shares the user's identifier.
impl From<&UserId> for RoomId {
    fn from(user: &UserId) -> Self {
        Self(user.as_str().to_owned())
    }
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Room -> members, plus the reverse connection -> rooms index so a disconnect only touches the
/// rooms that connection actually joined. Rooms that drain to zero members are pruned.
#[derive(Default)]
pub struct RoomIndex {
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
    memberships: HashMap<ConnectionId, HashSet<RoomId>>,
}

impl RoomIndex {
    /// Returns `true` if the connection was not already a member.
    pub fn join(&mut self, room: RoomId, connection: ConnectionId) -> bool {
        let added = self
            .rooms
            .entry(room.clone())
            .or_default()
            .insert(connection);
        if added {
            self.memberships.entry(connection).or_default().insert(room);
        }
        added
    }

    pub fn leave(&mut self, room: &RoomId, connection: ConnectionId) -> bool {
        let removed = remove_member(&mut self.rooms, room, &connection);
        if removed {
            remove_member(&mut self.memberships, &connection, room);
        }
        removed
    }

    /// Removes the connection from every room it joined. Returns how many rooms it left.
    pub fn leave_all(&mut self, connection: ConnectionId) -> usize {
        let Some(joined) = self.memberships.remove(&connection) else {
            return 0;
        };

        for room in &joined {
            remove_member(&mut self.rooms, room, &connection);
        }
        joined.len()
    }

    pub fn members(&self, room: &RoomId) -> impl Iterator<Item = ConnectionId> + '_ {
        self.rooms.get(room).into_iter().flatten().copied()
    }

    pub fn members_of(&self, room: &RoomId) -> HashSet<ConnectionId> {
        self.members(room).collect()
    }

    pub fn rooms_of(&self, connection: ConnectionId) -> HashSet<RoomId> {
        self.memberships
            .get(&connection)
            .cloned()
            .unwrap_or_default()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}

fn remove_member<K, V>(index: &mut HashMap<K, HashSet<V>>, key: &K, value: &V) -> bool
where
    K: Eq + std::hash::Hash,
    V: Eq + std::hash::Hash,
{
    let Some(set) = index.get_mut(key) else {
        return false;
    };
    let removed = set.remove(value);
    if set.is_empty() {
        index.remove(key);
    }
    removed
}
