use crate::ast::{Record, Table};
use serde::{Deserialize, Serialize};

/// In-memory snapshot of every table. Records keep insertion order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Database {
    #[serde(default)]
    users: Vec<Record>,
    #[serde(default)]
    communities: Vec<Record>,
    #[serde(default)]
    community_members: Vec<Record>,
    #[serde(default)]
    proposals: Vec<Record>,
    #[serde(default)]
    proposal_votes: Vec<Record>,
    #[serde(default)]
    posts: Vec<Record>,
    #[serde(default)]
    pledges: Vec<Record>,
    #[serde(default)]
    comments: Vec<Record>,
    #[serde(default)]
    sessions: Vec<Record>,
}

impl Database {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn table(&self, table: Table) -> &[Record] {
        match table {
            Table::Users => &self.users,
            Table::Communities => &self.communities,
            Table::CommunityMembers => &self.community_members,
            Table::Proposals => &self.proposals,
            Table::ProposalVotes => &self.proposal_votes,
            Table::Posts => &self.posts,
            Table::Pledges => &self.pledges,
            Table::Comments => &self.comments,
            Table::Sessions => &self.sessions,
        }
    }

    pub fn table_mut(&mut self, table: Table) -> &mut Vec<Record> {
        match table {
            Table::Users => &mut self.users,
            Table::Communities => &mut self.communities,
            Table::CommunityMembers => &mut self.community_members,
            Table::Proposals => &mut self.proposals,
            Table::ProposalVotes => &mut self.proposal_votes,
            Table::Posts => &mut self.posts,
            Table::Pledges => &mut self.pledges,
            Table::Comments => &mut self.comments,
            Table::Sessions => &mut self.sessions,
        }
    }

    pub fn append(&mut self, table: Table, record: Record) {
        self.table_mut(table).push(record);
    }

    /// Drops every record matching `predicate`, keeping the order of the rest.
    /// Returns the number of records removed.
    pub fn remove_where(&mut self, table: Table, mut predicate: impl FnMut(&Record) -> bool) -> usize {
        let records = self.table_mut(table);
        let before = records.len();
        records.retain(|record| !predicate(record));
        before - records.len()
    }

    pub fn clear(&mut self, table: Table) -> usize {
        let records = self.table_mut(table);
        let removed = records.len();
        records.clear();
        removed
    }

    pub fn len(&self) -> usize {
        Table::ALL.iter().map(|t| self.table(*t).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
