/// Per-worker read-mapping tallies, merged when the workers shut down.
#[derive(Debug, Default, Clone, Copy)]
pub struct MapCounters {
    pub received: u64,
    pub mapped: u64,
    pub multimapped: u64,
    pub too_short: u64,
}

impl std::ops::AddAssign for MapCounters {
    fn add_assign(&mut self, other: Self) {
        self.received += other.received;
        self.mapped += other.mapped;
        self.multimapped += other.multimapped;
        self.too_short += other.too_short;
    }
}

/// Per-graph tallies from the pruning stage.
#[derive(Debug, Default, Clone, Copy)]
pub struct PruneCounters {
    pub received: u64,
    pub discarded: u64,
    pub written: u64,
    pub surviving_paths: u64,
}

impl std::ops::AddAssign for PruneCounters {
    fn add_assign(&mut self, other: Self) {
        self.received += other.received;
        self.discarded += other.discarded;
        self.written += other.written;
        self.surviving_paths += other.surviving_paths;
    }
}
