use ethers::prelude::abigen;

// veNFT (Solidly-style voting escrow), read-only surface
abigen!(
    IVotingEscrow,
    r#"[
        function balanceOf(address owner) external view returns (uint256)
        function tokenOfOwnerByIndex(address owner, uint256 index) external view returns (uint256)
        function locked(uint256 tokenId) external view returns (int128 amount, uint256 end)
    ]"#
);
