use std::collections::HashMap;

/// Logical queries whose responses may race each other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Query {
    Defaulters,
    Grievances,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchTicket {
    query: Query,
    generation: u64,
}

impl FetchTicket {
    pub fn query(&self) -> Query {
        self.query
    }
}

/// Monotonic generation counter per query. Only the most recently issued
/// ticket for a query is current; responses carrying older tickets are stale.
#[derive(Debug, Default)]
pub struct Generations {
    latest: HashMap<Query, u64>,
}

impl Generations {
    pub fn issue(&mut self, query: Query) -> FetchTicket {
        let generation = self.latest.entry(query).or_insert(0);
        *generation += 1;
        FetchTicket {
            query,
            generation: *generation,
        }
    }

    pub fn is_current(&self, ticket: &FetchTicket) -> bool {
        self.latest.get(&ticket.query) == Some(&ticket.generation)
    }
}
