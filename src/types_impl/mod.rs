pub(crate) mod date;
pub(crate) mod decimal;
pub(crate) mod duration;
