use crate::error::{Error, Result};
use alloc::{boxed::Box, collections::BTreeMap, vec::Vec};
use uuid::Uuid;

/// Default lifetime of a poll (in seconds): one week.
pub const TTL: u64 = 7 * 24 * 60 * 60;

/// A votable option within a poll.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Choice<T> {
    /// Number of voters currently backing this choice.
    pub votes: u64,
    /// Opaque payload supplied by the latest vote that carried one.
    pub metadata: Option<T>,
}

impl<T> Default for Choice<T> {
    fn default() -> Self {
        Self { votes: 0, metadata: None }
    }
}

/// Choices keyed by their string key, kept in insertion order.
#[derive(Clone, Debug)]
pub struct Choices<T> {
    entries: Vec<(Box<str>, Choice<T>)>,
    /// Position of each key in `entries`.
    index: BTreeMap<Box<str>, usize>,
}

impl<T> Default for Choices<T> {
    fn default() -> Self {
        Self { entries: Vec::new(), index: BTreeMap::new() }
    }
}

impl<T: PartialEq> PartialEq for Choices<T> {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl<T: Eq> Eq for Choices<T> {}

impl<T> Choices<T> {
    fn position(&self, key: &str) -> Option<usize> {
        self.index.get(key).copied()
    }

    pub fn get(&self, key: &str) -> Option<&Choice<T>> {
        self.position(key).map(|index| &self.entries[index].1)
    }

    fn get_mut(&mut self, key: &str) -> Option<&mut Choice<T>> {
        self.position(key).map(|index| &mut self.entries[index].1)
    }

    fn get_or_insert(&mut self, key: &str) -> &mut Choice<T> {
        let index = match self.position(key) {
            Some(index) => index,
            None => {
                let index = self.entries.len();
                self.index.insert(key.into(), index);
                self.entries.push((key.into(), Choice::default()));
                index
            }
        };
        &mut self.entries[index].1
    }

    /// Appends a choice at the end. Hands the key back if it is already taken.
    pub(crate) fn push(&mut self, key: Box<str>, choice: Choice<T>) -> core::result::Result<(), Box<str>> {
        if self.index.contains_key(&key) {
            return Err(key);
        }
        self.index.insert(key.clone(), self.entries.len());
        self.entries.push((key, choice));
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Choice<T>)> {
        self.entries.iter().map(|(key, choice)| (key.as_ref(), choice))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A poll in which every voter holds at most one live vote.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Poll<T> {
    pub(crate) id: Uuid,
    /// Unix timestamp (in seconds) after which the store may drop the poll.
    pub(crate) expiration: u64,
    pub(crate) choices: Choices<T>,
    /// Maps each voter to the key of the choice they currently back.
    pub(crate) voters: BTreeMap<Box<str>, Box<str>>,
}

impl<T> Poll<T> {
    /// Creates an empty poll that expires one [week](TTL) after `now`.
    pub fn new(now: u64) -> Self {
        Self::with_ttl(now, TTL)
    }

    pub fn with_ttl(now: u64, ttl: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            expiration: now.saturating_add(ttl),
            choices: Choices::default(),
            voters: BTreeMap::new(),
        }
    }

    /// Reassembles a poll from stored parts, rejecting any state that
    /// [`vote`](Self::vote) could never have produced.
    pub fn from_parts(
        id: Uuid,
        expiration: u64,
        choices: Choices<T>,
        voters: BTreeMap<Box<str>, Box<str>>,
    ) -> Result<Self> {
        let mut backing = alloc::vec![0u64; choices.len()];
        for key in voters.values() {
            let index = choices.position(key).ok_or(Error::Corrupted)?;
            backing[index] += 1;
        }

        if choices.entries.iter().zip(backing).any(|((_, choice), count)| choice.votes != count) {
            return Err(Error::Corrupted);
        }

        if voters.keys().any(|voter| voter.is_empty()) || choices.entries.iter().any(|(key, _)| key.is_empty()) {
            return Err(Error::Corrupted);
        }

        Ok(Self { id, expiration, choices, voters })
    }

    pub const fn id(&self) -> Uuid {
        self.id
    }

    pub const fn expiration(&self) -> u64 {
        self.expiration
    }

    pub const fn choices(&self) -> &Choices<T> {
        &self.choices
    }

    /// The choice key currently backed by the given voter, if any.
    pub fn voter(&self, voter: &str) -> Option<&str> {
        self.voters.get(voter).map(|choice| choice.as_ref())
    }

    pub fn voters(&self) -> impl Iterator<Item = (&str, &str)> {
        self.voters.iter().map(|(voter, choice)| (voter.as_ref(), choice.as_ref()))
    }

    /// Number of live votes, which is also the number of distinct voters.
    pub fn total(&self) -> usize {
        self.voters.len()
    }

    /// Casts (or moves) the vote of `voter` onto `choice`.
    ///
    /// A voter who already backs another choice has that vote withdrawn first,
    /// so each voter contributes exactly one vote. If `metadata` is given, it
    /// replaces whatever the choice previously carried.
    pub fn vote(&mut self, choice: &str, voter: &str, metadata: Option<T>) -> Result<()> {
        if choice.is_empty() || voter.is_empty() {
            return Err(Error::BadInput);
        }

        // Withdrawal must come first so that re-selecting the same choice cancels out.
        if let Some(previous) = self.voters.get(voter) {
            let previous = self.choices.get_mut(previous).ok_or(Error::Corrupted)?;
            previous.votes = previous.votes.checked_sub(1).ok_or(Error::Corrupted)?;
        }

        let target = self.choices.get_or_insert(choice);
        if metadata.is_some() {
            target.metadata = metadata;
        }
        target.votes += 1;

        self.voters.insert(voter.into(), choice.into());
        Ok(())
    }

    pub fn tally(&self, choice: &str) -> u64 {
        self.choices.get(choice).map_or(0, |choice| choice.votes)
    }

    /// The choice with the most votes. Ties go to the earliest-inserted choice.
    pub fn leader(&self) -> Option<(&str, &Choice<T>)> {
        let mut iter = self.choices.iter();
        let first = iter.next()?;
        Some(iter.fold(first, |best, current| if current.1.votes > best.1.votes { current } else { best }))
    }
}

#[cfg(test)]
mod tests {
    use super::{Choice, Choices, Poll, TTL};
    use crate::error::Error;
    use alloc::{boxed::Box, collections::BTreeMap, vec, vec::Vec};

    type Simple = Poll<()>;

    fn sum(poll: &Simple) -> u64 {
        poll.choices().iter().map(|(_, choice)| choice.votes).sum()
    }

    #[test]
    fn new_poll_is_empty() {
        let poll = Simple::new(1_000);
        assert_eq!(poll.expiration(), 1_000 + TTL);
        assert!(poll.choices().is_empty());
        assert_eq!(poll.total(), 0);
        assert!(poll.leader().is_none());
        assert_ne!(poll.id(), Simple::new(1_000).id());
    }

    #[test]
    fn custom_ttl_saturates() {
        assert_eq!(Simple::with_ttl(10, 5).expiration(), 15);
        assert_eq!(Simple::with_ttl(u64::MAX - 1, 5).expiration(), u64::MAX);
    }

    #[test]
    fn unknown_choice_has_no_votes() {
        let mut poll = Simple::new(0);
        assert_eq!(poll.tally("never-voted-key"), 0);
        poll.vote("a", "alice", None).unwrap();
        assert_eq!(poll.tally("never-voted-key"), 0);
        assert!(poll.choices().get("never-voted-key").is_none());
    }

    #[test]
    fn revote_moves_the_vote() {
        let mut poll = Simple::new(0);
        poll.vote("a", "alice", None).unwrap();
        poll.vote("b", "alice", None).unwrap();
        assert_eq!(poll.tally("a"), 0);
        assert_eq!(poll.tally("b"), 1);
        assert_eq!(poll.voter("alice"), Some("b"));

        // The abandoned choice stays around with zero votes.
        assert_eq!(poll.choices().len(), 2);
    }

    #[test]
    fn same_choice_twice_is_idempotent() {
        let mut poll = Simple::new(0);
        poll.vote("a", "alice", None).unwrap();
        poll.vote("a", "alice", None).unwrap();
        assert_eq!(poll.tally("a"), 1);
        assert_eq!(poll.voter("alice"), Some("a"));
        assert_eq!(poll.total(), 1);
    }

    #[test]
    fn one_vote_per_voter() {
        let mut poll = Simple::new(0);
        let script = [
            ("a", "u1"),
            ("b", "u2"),
            ("c", "u3"),
            ("a", "u2"),
            ("c", "u1"),
            ("c", "u1"),
            ("b", "u4"),
            ("a", "u3"),
            ("b", "u2"),
        ];
        for (choice, voter) in script {
            poll.vote(choice, voter, None).unwrap();
            assert_eq!(sum(&poll), poll.total() as u64);
        }
        assert_eq!(poll.total(), 4);
        assert_eq!(poll.tally("a"), 1);
        assert_eq!(poll.tally("b"), 2);
        assert_eq!(poll.tally("c"), 1);
    }

    #[test]
    fn leader_prefers_earliest_on_ties() {
        let mut poll = Simple::new(0);
        poll.vote("a", "u1", None).unwrap();
        poll.vote("b", "u2", None).unwrap();
        assert_eq!(poll.leader().map(|(key, _)| key), Some("a"));

        poll.vote("b", "u3", None).unwrap();
        assert_eq!(poll.leader().map(|(key, _)| key), Some("b"));

        poll.vote("a", "u4", None).unwrap();
        assert_eq!(poll.leader().map(|(key, _)| key), Some("a"));
    }

    #[test]
    fn end_to_end_scenario() {
        let mut poll = Simple::new(0);
        poll.vote("opt1", "userA", None).unwrap();
        poll.vote("opt2", "userB", None).unwrap();
        poll.vote("opt1", "userB", None).unwrap();
        assert_eq!(poll.tally("opt1"), 2);
        assert_eq!(poll.tally("opt2"), 0);

        let (key, choice) = poll.leader().unwrap();
        assert_eq!(key, "opt1");
        assert_eq!(choice.votes, 2);
    }

    #[test]
    fn metadata_is_last_writer_wins() {
        let mut poll = Poll::<&str>::new(0);
        poll.vote("42", "u1", Some("Ferris")).unwrap();
        poll.vote("42", "u2", None).unwrap();
        assert_eq!(poll.choices().get("42").unwrap().metadata, Some("Ferris"));

        poll.vote("42", "u3", Some("Crab")).unwrap();
        let choice = poll.choices().get("42").unwrap();
        assert_eq!(choice.metadata, Some("Crab"));
        assert_eq!(choice.votes, 3);
    }

    #[test]
    fn empty_keys_are_rejected() {
        let mut poll = Simple::new(0);
        assert_eq!(poll.vote("", "u1", None), Err(Error::BadInput));
        assert_eq!(poll.vote("a", "", None), Err(Error::BadInput));
        assert!(poll.choices().is_empty());
        assert_eq!(poll.total(), 0);
    }

    #[test]
    fn dangling_voter_fails_loudly() {
        let mut poll = Simple::new(0);
        poll.vote("a", "u1", None).unwrap();
        poll.voters.insert("u1".into(), "ghost".into());

        let before = poll.clone();
        assert_eq!(poll.vote("b", "u1", None), Err(Error::Corrupted));
        assert_eq!(poll, before);
    }

    #[test]
    fn underflow_fails_loudly() {
        let mut poll = Simple::new(0);
        poll.vote("a", "u1", None).unwrap();
        poll.choices.entries[0].1.votes = 0;
        assert_eq!(poll.vote("a", "u1", None), Err(Error::Corrupted));
    }

    #[test]
    fn from_parts_checks_invariants() {
        let id = uuid::Uuid::new_v4();
        let choices = |votes: &[(&str, u64)]| {
            let mut choices = Choices::default();
            for &(key, votes) in votes {
                choices.push(Box::from(key), Choice { votes, metadata: None::<()> }).unwrap();
            }
            choices
        };
        let voters = |pairs: &[(&str, &str)]| -> BTreeMap<Box<str>, Box<str>> {
            pairs.iter().map(|&(voter, choice)| (voter.into(), choice.into())).collect()
        };

        let poll = Poll::from_parts(id, 5, choices(&[("a", 1), ("b", 0)]), voters(&[("u1", "a")])).unwrap();
        assert_eq!(poll.id(), id);
        assert_eq!(poll.tally("a"), 1);

        // Voter points at a missing choice.
        let result = Poll::from_parts(id, 5, choices(&[("a", 1)]), voters(&[("u1", "b")]));
        assert_eq!(result, Err(Error::Corrupted));

        // Counts disagree with the voter index.
        let result = Poll::from_parts(id, 5, choices(&[("a", 2)]), voters(&[("u1", "a")]));
        assert_eq!(result, Err(Error::Corrupted));

        // Votes without voters.
        let result = Poll::from_parts(id, 5, choices(&[("a", 0), ("b", 1)]), voters(&[]));
        assert_eq!(result, Err(Error::Corrupted));

        // Empty keys.
        let result = Poll::from_parts(id, 5, choices(&[("", 1)]), voters(&[("u1", "")]));
        assert_eq!(result, Err(Error::Corrupted));
    }

    #[test]
    fn choices_keep_insertion_order() {
        let mut poll = Simple::new(0);
        for (choice, voter) in [("z", "u1"), ("a", "u2"), ("m", "u3")] {
            poll.vote(choice, voter, None).unwrap();
        }
        let keys: Vec<_> = poll.choices().iter().map(|(key, _)| key).collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
    }

    #[test]
    fn many_choices_stay_indexed() {
        let mut poll = Simple::new(0);
        for i in 0..500 {
            poll.vote(&alloc::format!("c{i}"), &alloc::format!("u{i}"), None).unwrap();
        }
        poll.vote("c250", "u0", None).unwrap();

        assert_eq!(poll.choices().len(), 500);
        assert_eq!(poll.tally("c0"), 0);
        assert_eq!(poll.tally("c250"), 2);
        assert_eq!(poll.tally("c499"), 1);
        assert_eq!(poll.leader().map(|(key, _)| key), Some("c250"));

        // Moving everyone off a choice keeps its slot and position.
        poll.vote("c1", "u250", None).unwrap();
        poll.vote("c1", "u0", None).unwrap();
        assert_eq!(poll.choices().iter().nth(250).map(|(key, choice)| (key, choice.votes)), Some(("c250", 0)));
        assert_eq!(poll.leader().map(|(key, _)| key), Some("c1"));
    }
}
