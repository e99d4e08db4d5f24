pub mod consolidate;
pub mod db;
pub mod matcher;
pub mod name_normalizer;
