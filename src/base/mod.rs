mod result_set;

pub use self::result_set::ResultSet;
