pub mod assignment;
pub mod core;
pub mod school_years;
pub mod sections;
pub mod setup;
pub mod students;
