//! Plain-text views of the synchronized contract state.

use std::fmt::Write as _;

use shared::domain::{PhaseView, TxHash, WorkflowPhase};
use voting_client::{
    actions::{self, ActionKind},
    ContractSnapshot, PendingTransaction, TxStatus, WinnerView,
};

pub fn phase_label(phase: PhaseView) -> &'static str {
    match phase.phase() {
        Some(phase) => phase.label(),
        None => "Loading...",
    }
}

fn action_label(action: ActionKind) -> &'static str {
    match action {
        ActionKind::AdvancePhase => "set-phase",
        ActionKind::RegisterCandidate => "register",
        ActionKind::Vote => "vote",
        ActionKind::Fund => "fund",
        ActionKind::Withdraw => "withdraw",
        ActionKind::GetWinner => "winner",
    }
}

pub fn explorer_link(base: &str, hash: TxHash) -> String {
    if base.ends_with('/') {
        format!("{base}{hash}")
    } else {
        format!("{base}/{hash}")
    }
}

pub fn render_snapshot(snapshot: &ContractSnapshot) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Current phase: {} ({})",
        phase_label(snapshot.phase),
        snapshot.phase.code()
    );

    out.push_str("Admin controls:\n");
    for phase in WorkflowPhase::ALL {
        let marker = if snapshot.phase.is(phase) { "*" } else { " " };
        let _ = writeln!(out, " {marker} {}: {}", phase.ordinal(), phase.label());
    }

    let voting_open = actions::is_permitted(snapshot.phase, ActionKind::Vote);
    out.push_str("Candidates:\n");
    if snapshot.candidates.is_empty() {
        out.push_str("  No candidates found.\n");
    }
    for candidate in &snapshot.candidates {
        let _ = writeln!(
            out,
            "  [{}] {} - {} votes ({}){}",
            candidate.index,
            candidate.name,
            candidate.vote_count,
            candidate.address,
            if voting_open { "  [vote open]" } else { "" }
        );
    }
    if !voting_open {
        out.push_str("  Voting is closed.\n");
    }

    let available: Vec<&str> = actions::permitted_actions(snapshot.phase)
        .into_iter()
        .map(action_label)
        .collect();
    let _ = writeln!(out, "Available actions: {}", available.join(", "));

    if let Some(tx) = &snapshot.pending {
        out.push_str(&render_pending(tx, None));
    }
    if snapshot.winner != WinnerView::NotRequested {
        let _ = writeln!(out, "{}", render_winner(&snapshot.winner));
    }
    out
}

pub fn render_pending(tx: &PendingTransaction, explorer_base: Option<&str>) -> String {
    let mut out = String::new();
    let _ = write!(out, "Transaction #{} ({})", tx.ticket.0, tx.call.function_name());
    match tx.hash {
        Some(hash) => {
            let _ = writeln!(out, ": {hash}");
            if let Some(base) = explorer_base {
                let _ = writeln!(out, "  {}", explorer_link(base, hash));
            }
        }
        None => out.push('\n'),
    }
    let status = match &tx.status {
        TxStatus::Submitting => "Waiting for wallet...".to_string(),
        TxStatus::Confirming => "Confirming...".to_string(),
        TxStatus::Confirmed => "Confirmed!".to_string(),
        TxStatus::Failed { reason } => format!("Error: {reason}"),
    };
    let _ = writeln!(out, "  {status}");
    out
}

pub fn render_winner(winner: &WinnerView) -> String {
    match winner {
        WinnerView::Decided(winner) => format!("Winner: {winner}"),
        WinnerView::Undecided | WinnerView::NotRequested => "Cannot get winner yet".into(),
    }
}
