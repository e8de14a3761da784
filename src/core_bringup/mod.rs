pub mod display_setup;
pub mod error;
pub mod sentinel;
pub mod worker;

#[cfg(test)]
mod test_bringup;
