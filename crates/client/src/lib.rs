//! Client side of doppel: program stand-ins and drive them through a
//! [`Backend`].
//!
//! ```ignore
//! let chain = Arc::new(LocalChain::new());
//! let mut mock = MockContract::deploy(chain, parse_abi(ABI)?, DeployOptions::default()).await?;
//! mock.stub("read")?.returns([uint(5)])?.await?;
//! ```

pub mod backend;
pub mod codec;
pub mod deploy;
pub mod local;
pub mod mock;
pub mod stub;

pub use backend::Backend;
pub use codec::{parse_abi, Contract};
pub use deploy::{deploy_stand_in, DeployOptions};
pub use local::{LocalChain, NativeCall, NativeContract, DEFAULT_SENDER};
pub use mock::MockContract;
pub use stub::{ReceiveStub, Stub};
