//! Per-operation membership policy.
//!
//! Which lifecycle states may serve an operation, and which states make the
//! ring walk pick one extra replica, are pure functions of
//! `(InstanceState, Operation)`.

use std::fmt;

use crate::member::InstanceState;

/// The kind of request a replication set is built for.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub enum Operation {
    /// Ingestion. LEAVING members are skipped and replaced by the next member
    /// on the ring so the write still reaches `rf` healthy replicas.
    Write,
    /// Ingestion without replacing skipped members.
    WriteNoExtend,
    /// Queries. LEAVING members still hold data that has not been flushed.
    Read,
    /// Status pages and discovery: every registered member counts.
    Reporting,
}

impl Operation {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Write => "write",
            Operation::WriteNoExtend => "write_no_extend",
            Operation::Read => "read",
            Operation::Reporting => "reporting",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Whether a member in `state` may serve `op`.
pub fn is_healthy_for(state: InstanceState, op: Operation) -> bool {
    use InstanceState::*;
    match op {
        Operation::Write | Operation::WriteNoExtend => matches!(state, Joining | Active),
        Operation::Read => matches!(state, Active | Leaving),
        Operation::Reporting => true,
    }
}

/// Whether walking over a member in `state` raises the number of replicas
/// the ring walk collects for `op`.
pub fn should_extend_replica_set(state: InstanceState, op: Operation) -> bool {
    matches!((op, state), (Operation::Write, InstanceState::Leaving))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_policy() {
        assert!(is_healthy_for(InstanceState::Joining, Operation::Write));
        assert!(is_healthy_for(InstanceState::Active, Operation::Write));
        assert!(!is_healthy_for(InstanceState::Leaving, Operation::Write));
        assert!(!is_healthy_for(InstanceState::Left, Operation::Write));
        assert!(should_extend_replica_set(InstanceState::Leaving, Operation::Write));
        assert!(!should_extend_replica_set(InstanceState::Leaving, Operation::WriteNoExtend));
    }

    #[test]
    fn test_read_policy() {
        assert!(!is_healthy_for(InstanceState::Joining, Operation::Read));
        assert!(is_healthy_for(InstanceState::Active, Operation::Read));
        assert!(is_healthy_for(InstanceState::Leaving, Operation::Read));
        assert!(!is_healthy_for(InstanceState::Left, Operation::Read));
        for state in InstanceState::ALL {
            assert!(!should_extend_replica_set(state, Operation::Read));
        }
    }

    #[test]
    fn test_reporting_accepts_everything() {
        for state in InstanceState::ALL {
            assert!(is_healthy_for(state, Operation::Reporting));
        }
    }
}
