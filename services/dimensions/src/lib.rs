//! Dimension builders for the cooperative analytics star schema.
//!
//! - [`table`]: raw table loading and lenient field parsing
//! - [`geography`]: province → district → subdistrict → village dimension
//! - [`period`]: year → quarter → month → week dimension

pub mod geography;
pub mod period;
pub mod table;

/// File name of the geography dimension inside the result directory.
pub const GEOGRAPHY_FILE: &str = "DIM_GEOGRAPHY.csv";

/// File name of the period dimension inside the result directory.
pub const PERIOD_FILE: &str = "DIM_PERIOD.csv";
