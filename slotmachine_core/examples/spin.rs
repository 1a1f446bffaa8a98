use slotmachine_core::{
    Address, GameConfig, InMemoryLedger, ProvablyFairEntropy, SlotMachine, SymbolTable,
};

fn main() -> slotmachine_core::Result<()> {
    // Example end-to-end play against an in-memory token
    let token = Address::from_low_u64(0x70);
    let house = Address::from_low_u64(0x40);
    let operator = Address::from_low_u64(0x01);
    let player = Address::from_low_u64(0xa1);

    let mut ledger = InMemoryLedger::new();
    ledger.mint(&token, &house, 10_000)?;
    ledger.mint(&token, &player, 100)?;
    ledger.approve(&token, &player, &house, 100);

    let entropy = ProvablyFairEntropy::new("example-server-seed", 0);
    let config = GameConfig {
        token,
        min_wager: 1,
        max_wager: 10,
        house_edge_bps: 500,
        history_capacity: 10,
    };
    let mut machine = SlotMachine::new(house, operator, config, SymbolTable::default(), ledger, entropy)?;

    for round in 0..5 {
        let settlement = machine.play(player, 10, &format!("example-client-seed-{round}"))?;
        println!(
            "server_seed_hash={} nonce={} payout={} grid={:?}",
            machine.entropy().server_seed_hash_hex(),
            settlement.nonce,
            settlement.payout,
            settlement.grid.rows()
        );
    }
    println!("stats={:?}", machine.aggregate_stats());
    Ok(())
}
