pub mod executor;
pub mod facet;
pub mod filter;
pub mod fuzzy;
pub mod phrase;
pub mod prefix;
pub mod results;
