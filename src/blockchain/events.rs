//! ABI of the vault events the scanner listens to.

use alloy_sol_types::sol;

sol! {
    /// Emitted by the teller when a user deposits into the vault.
    #[derive(Debug, PartialEq, Eq)]
    event Deposit(
        uint256 indexed nonce,
        address indexed receiver,
        address indexed depositAsset,
        uint256 depositAmount,
        uint256 shareAmount,
        uint256 depositTimestamp,
        uint256 shareLockPeriodAtTimeOfDeposit
    );

    /// Emitted by the atomic queue whenever a user's withdrawal request is created or revised.
    #[derive(Debug, PartialEq, Eq)]
    event AtomicRequestUpdated(
        address indexed user,
        address indexed offerToken,
        address indexed wantToken,
        uint256 amount,
        uint256 deadline,
        uint256 minPrice,
        uint256 timestamp
    );

    /// Emitted by the atomic queue when a solver fills a request.
    #[derive(Debug, PartialEq, Eq)]
    event AtomicRequestFulfilled(
        address indexed user,
        address indexed offerToken,
        address indexed wantToken,
        uint256 offerAmountSpent,
        uint256 wantAmountReceived,
        uint256 timestamp
    );
}
