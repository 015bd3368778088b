// Contracts Module - Public ABIs Only

pub mod voting_escrow;

pub use voting_escrow::{
    BalanceOfCall, IVotingEscrow, IVotingEscrowCalls, LockedCall, LockedReturn,
    TokenOfOwnerByIndexCall,
};
