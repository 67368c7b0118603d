// bank_core: shared types, address derivation and wire formats for the bank program.
//
//! This crate contains the instruction enum, the receiving account state,
//! and the address derivation helpers used by the off-chain client. Nothing
//! in here talks to the network.

pub mod address;
pub mod instruction;
pub mod state;

pub use address::{Address, AddressError};
pub use instruction::{BankInstruction, InstructionError};
pub use state::{RecordError, ReceiverState};

// ---------------------------------------------------------------------------
// Protocol constants
// ---------------------------------------------------------------------------

/// Seed used with `derive_seeded` (base = deposit payer, owner = bank program)
/// to locate the account that receives money and the note.
pub const RECEIVING_SEED: &str = "I want money";

/// Seed for the program-derived authority that signs withdrawals.
pub const AUTHORITY_SEED: &[u8] = b"bank store";

/// File names produced by building and deploying the bank program.
pub const PROGRAM_SO_NAME: &str = "solana_bank_example.so";
pub const PROGRAM_KEYPAIR_NAME: &str = "solana_bank_example-keypair.json";

/// Compute the receiving account address for a payer and program.
///
/// `address = derive_seeded(payer, RECEIVING_SEED, program_id)`
pub fn compute_receiving_address(
    payer: &Address,
    program_id: &Address,
) -> Result<Address, AddressError> {
    address::derive_seeded(payer, RECEIVING_SEED, program_id)
}

/// Compute the withdraw authority PDA and its bump for the bank program.
///
/// `(address, bump) = derive_program_address([AUTHORITY_SEED], program_id)`
pub fn compute_authority_pda(program_id: &Address) -> Result<(Address, u8), AddressError> {
    address::derive_program_address(&[AUTHORITY_SEED], program_id)
}
