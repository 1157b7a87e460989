//! Futures support: contract chains and continuous contract mapping.

pub mod chain;
pub mod mapper;

pub use chain::{ContractChain, FutureContract, StaticContractChain};
pub use mapper::{
    ContinuousContractMapper, ContinuousMapping, ContinuousSettings, ContinuousSpec,
    MappingChangeEvent, MappingError, MappingFailure, MappingMode, NormalizationMode,
};
