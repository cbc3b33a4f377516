//! Scylla's shard model: every node advertises its shard count in the
//! SUPPORTED options, and a connection lands on the shard that the client's
//! local source port selects (`port mod nr_shards`).

/// Sharding parameters of one node, learned from the SUPPORTED handshake.
/// Absence of this information implies single-shard treatment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShardingInfo {
    nr_shards: u32,
    ignore_msb: u32,
    shard_aware_port: Option<u16>,
    shard_aware_port_ssl: Option<u16>,
}

impl ShardingInfo {
    pub(crate) fn new(
        nr_shards: u32,
        ignore_msb: u32,
        shard_aware_port: Option<u16>,
        shard_aware_port_ssl: Option<u16>,
    ) -> Self {
        Self {
            nr_shards: nr_shards.max(1),
            ignore_msb,
            shard_aware_port,
            shard_aware_port_ssl,
        }
    }

    /// Number of shards of the node.
    pub fn nr_shards(&self) -> u32 {
        self.nr_shards
    }

    /// The port on which source-port-based shard selection is honored.
    pub fn shard_aware_port(&self) -> Option<u16> {
        self.shard_aware_port
    }

    /// Like [`shard_aware_port`](Self::shard_aware_port), for TLS.
    pub fn shard_aware_port_ssl(&self) -> Option<u16> {
        self.shard_aware_port_ssl
    }

    /// The shard owning the given token.
    ///
    /// The token is biased into the unsigned range, the configured number of
    /// most-significant bits is shifted out, and the remainder is scaled to
    /// the shard count.
    #[allow(clippy::cast_possible_truncation)]
    #[allow(clippy::cast_sign_loss)]
    pub fn shard_of_token(&self, token: i64) -> u32 {
        let biased = (token as u64).wrapping_add(1_u64 << 63);
        let shifted = biased.wrapping_shl(self.ignore_msb);
        ((u128::from(shifted) * u128::from(self.nr_shards)) >> 64) as u32
    }

    /// The smallest usable source port that selects the given shard.
    pub(crate) fn first_source_port(&self, shard: u32) -> u16 {
        let nr_shards = self.nr_shards;
        let base = (49_152 + nr_shards - 1) / nr_shards * nr_shards;
        #[allow(clippy::cast_possible_truncation)]
        let port = (base + shard) as u16;
        port
    }

    /// The next source port selecting the same shard, if any remains below
    /// the port ceiling.
    pub(crate) fn next_source_port(&self, port: u16) -> Option<u16> {
        #[allow(clippy::cast_possible_truncation)]
        u32::from(port)
            .checked_add(self.nr_shards)
            .filter(|p| *p <= u32::from(u16::MAX))
            .map(|p| p as u16)
    }

    /// Deterministic shard choice for a new connection: the shard furthest
    /// below its per-shard connection target. Ties resolve to the lowest
    /// shard id, so concurrent growers converge on the same answer.
    pub(crate) fn least_populated_shard(
        &self,
        existing_per_shard: &[usize],
        target_per_shard: usize,
    ) -> u32 {
        let mut best_shard = 0_u32;
        let mut best_missing = 0_isize;
        for shard in 0..self.nr_shards {
            let existing = existing_per_shard
                .get(shard as usize)
                .copied()
                .unwrap_or(0);
            #[allow(clippy::cast_possible_wrap)]
            let missing = target_per_shard as isize - existing as isize;
            if missing > best_missing {
                best_missing = missing;
                best_shard = shard;
            }
        }
        best_shard
    }
}
