use crate::key::Key;
use crate::name::covers;

/// Ordered set of keys, unique by name.
///
/// Keys are kept sorted by name; appending a key whose name is already
/// present replaces the existing entry. A movable cursor supports the
/// "current key" convention used by plugins to mark the key that caused
/// an error.
#[derive(Debug, Default, Clone)]
pub struct KeySet {
    keys: Vec<Key>,
    cursor: Option<usize>,
}

impl KeySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Append a key, replacing any existing key with the same name.
    pub fn append(&mut self, key: Key) {
        match self.keys.binary_search_by(|k| k.name().cmp(key.name())) {
            Ok(idx) => self.keys[idx] = key,
            Err(idx) => self.keys.insert(idx, key),
        }
    }

    /// Append every key of `other`, deduplicating by name.
    pub fn append_all(&mut self, other: KeySet) {
        for key in other.keys {
            self.append(key);
        }
    }

    pub fn lookup(&self, name: &str) -> Option<&Key> {
        self.keys
            .binary_search_by(|k| k.name().cmp(name))
            .ok()
            .map(|idx| &self.keys[idx])
    }

    pub fn lookup_mut(&mut self, name: &str) -> Option<&mut Key> {
        match self.keys.binary_search_by(|k| k.name().cmp(name)) {
            Ok(idx) => Some(&mut self.keys[idx]),
            Err(_) => None,
        }
    }

    /// Remove and return the key with the given name.
    pub fn remove(&mut self, name: &str) -> Option<Key> {
        match self.keys.binary_search_by(|k| k.name().cmp(name)) {
            Ok(idx) => {
                self.cursor = None;
                Some(self.keys.remove(idx))
            }
            Err(_) => None,
        }
    }

    /// Iterate over the keys at or below `parent`, in name order.
    pub fn below<'a>(&'a self, parent: &'a str) -> impl Iterator<Item = &'a Key> {
        self.keys.iter().filter(move |k| covers(parent, k.name()))
    }

    /// Remove and return all keys at or below `parent`.
    pub fn cut(&mut self, parent: &str) -> KeySet {
        self.cursor = None;
        let mut kept = Vec::with_capacity(self.keys.len());
        let mut taken = Vec::new();
        for key in self.keys.drain(..) {
            if covers(parent, key.name()) {
                taken.push(key);
            } else {
                kept.push(key);
            }
        }
        self.keys = kept;
        KeySet {
            keys: taken,
            cursor: None,
        }
    }

    pub fn clear(&mut self) {
        self.keys.clear();
        self.cursor = None;
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Key> {
        self.keys.iter()
    }

    pub fn iter_mut(&mut self) -> std::slice::IterMut<'_, Key> {
        self.keys.iter_mut()
    }

    /// Reset the cursor to before the first key.
    pub fn rewind(&mut self) {
        self.cursor = None;
    }

    /// Advance the cursor and return the new current key.
    pub fn next_key(&mut self) -> Option<&Key> {
        let next = match self.cursor {
            None => 0,
            Some(c) => c + 1,
        };
        if next < self.keys.len() {
            self.cursor = Some(next);
            Some(&self.keys[next])
        } else {
            None
        }
    }

    /// The key the cursor currently points at.
    pub fn current(&self) -> Option<&Key> {
        self.cursor.and_then(|c| self.keys.get(c))
    }

    /// Move the cursor to the key with the given name. Returns whether
    /// the key was found.
    pub fn set_cursor(&mut self, name: &str) -> bool {
        match self.keys.binary_search_by(|k| k.name().cmp(name)) {
            Ok(idx) => {
                self.cursor = Some(idx);
                true
            }
            Err(_) => false,
        }
    }
}

impl PartialEq for KeySet {
    /// Equality compares keys only; the cursor is transient state.
    fn eq(&self, other: &Self) -> bool {
        self.keys == other.keys
    }
}

impl Eq for KeySet {}

impl FromIterator<Key> for KeySet {
    fn from_iter<I: IntoIterator<Item = Key>>(iter: I) -> Self {
        let mut ks = KeySet::new();
        for key in iter {
            ks.append(key);
        }
        ks
    }
}

impl<'a> IntoIterator for &'a KeySet {
    type Item = &'a Key;
    type IntoIter = std::slice::Iter<'a, Key>;

    fn into_iter(self) -> Self::IntoIter {
        self.keys.iter()
    }
}
