use crate::pool::ShardingInfo;
use crate::protocol::util_sync;
use crate::CqlResult;
use std::collections::HashMap;

/// The option multimap of a SUPPORTED message, with typed access to the
/// entries the core cares about.
#[derive(Debug, Default)]
pub(crate) struct SupportedOptions {
    options: HashMap<String, Vec<String>>,
}

impl SupportedOptions {
    pub(crate) fn parse(rdr: &mut dyn std::io::Read) -> CqlResult<Self> {
        Ok(Self {
            options: util_sync::read_string_multimap(rdr)?,
        })
    }

    fn first(&self, key: &str) -> Option<&str> {
        self.options
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    fn first_parsed<T: std::str::FromStr>(&self, key: &str) -> Option<T> {
        self.first(key).and_then(|v| v.parse().ok())
    }

    /// Compression algorithms the server offers.
    pub(crate) fn compression_algorithms(&self) -> &[String] {
        self.options
            .get("COMPRESSION")
            .map_or(&[], Vec::as_slice)
    }

    /// Shard id this very connection landed on (Scylla).
    pub(crate) fn shard_of_connection(&self) -> Option<u32> {
        self.first_parsed("SCYLLA_SHARD")
    }

    /// Sharding parameters advertised by a Scylla server; absence implies
    /// single-shard treatment.
    pub(crate) fn sharding_info(&self) -> Option<ShardingInfo> {
        let nr_shards = self.first_parsed("SCYLLA_NR_SHARDS")?;
        let ignore_msb = self
            .first_parsed("SCYLLA_SHARDING_IGNORE_MSB")
            .unwrap_or(0);
        Some(ShardingInfo::new(
            nr_shards,
            ignore_msb,
            self.first_parsed("SCYLLA_SHARD_AWARE_PORT"),
            self.first_parsed("SCYLLA_SHARD_AWARE_PORT_SSL"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::SupportedOptions;
    use crate::protocol::util_sync;
    use std::io::Cursor;

    #[test]
    fn scylla_options_are_recognized() {
        let mut buf = Vec::new();
        util_sync::write_short(5, &mut buf).unwrap();
        for (key, value) in [
            ("CQL_VERSION", "3.0.0"),
            ("COMPRESSION", "lz4"),
            ("SCYLLA_NR_SHARDS", "4"),
            ("SCYLLA_SHARD_AWARE_PORT", "19042"),
            ("SCYLLA_SHARD", "2"),
        ] {
            util_sync::write_string(key, &mut buf).unwrap();
            util_sync::write_short(1, &mut buf).unwrap();
            util_sync::write_string(value, &mut buf).unwrap();
        }
        let supported = SupportedOptions::parse(&mut Cursor::new(buf)).unwrap();
        assert_eq!(supported.compression_algorithms(), ["lz4".to_string()]);
        assert_eq!(supported.shard_of_connection(), Some(2));
        let sharding = supported.sharding_info().unwrap();
        assert_eq!(sharding.nr_shards(), 4);
        assert_eq!(sharding.shard_aware_port(), Some(19042));
    }

    #[test]
    fn cassandra_has_no_sharding() {
        let mut buf = Vec::new();
        util_sync::write_short(1, &mut buf).unwrap();
        util_sync::write_string("CQL_VERSION", &mut buf).unwrap();
        util_sync::write_short(1, &mut buf).unwrap();
        util_sync::write_string("3.4.5", &mut buf).unwrap();
        let supported = SupportedOptions::parse(&mut Cursor::new(buf)).unwrap();
        assert!(supported.sharding_info().is_none());
    }
}
