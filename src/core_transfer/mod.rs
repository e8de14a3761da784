pub mod compression;
pub mod error;
pub mod incoming;
pub mod outgoing;
pub mod pieces;
pub mod state;

#[cfg(test)]
mod test_transfer;
