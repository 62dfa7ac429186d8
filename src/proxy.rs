//! Deterministic collaborator addresses.
//!
//! Proxies are deployed with CREATE2 from the proxy manager, salted with
//! `keccak256(implementation_id ‖ salt)`. Anyone who knows the manager address, the
//! proxy init-code hash, the implementation ID and the caller salt can compute the
//! address before deployment, and the controller uses that to authenticate callers
//! (only the derived initializer may finish a prepared pool).

use ethers::types::{Address, H256, U256};
use ethers::utils::{get_create2_address_from_hash, keccak256};

/// Computes proxy addresses for one proxy manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProxyDeriver {
    pub deployer: Address,
    pub init_code_hash: H256,
}

impl ProxyDeriver {
    pub fn new(deployer: Address, init_code_hash: H256) -> Self {
        Self {
            deployer,
            init_code_hash,
        }
    }

    pub fn derive_address(&self, implementation_id: H256, salt: H256) -> Address {
        derive_address(self.deployer, implementation_id, salt, self.init_code_hash)
    }
}

/// CREATE2 address of a many-to-one proxy.
pub fn derive_address(deployer: Address, implementation_id: H256, salt: H256, init_code_hash: H256) -> Address {
    let mut packed = [0u8; 64];
    packed[..32].copy_from_slice(implementation_id.as_bytes());
    packed[32..].copy_from_slice(salt.as_bytes());
    let proxy_salt = keccak256(packed);
    get_create2_address_from_hash(deployer, proxy_salt, init_code_hash)
}

/// Salt of an index pool: `keccak256(uint256(category_id) ‖ uint256(index_size))`.
pub fn pool_salt(category_id: u64, index_size: usize) -> H256 {
    let mut packed = [0u8; 64];
    U256::from(category_id).to_big_endian(&mut packed[..32]);
    U256::from(index_size).to_big_endian(&mut packed[32..]);
    H256::from(keccak256(packed))
}

/// Salt of a pool's initializer and token seller: `keccak256(pool)`.
pub fn pool_companion_salt(pool: Address) -> H256 {
    H256::from(keccak256(pool.as_bytes()))
}
