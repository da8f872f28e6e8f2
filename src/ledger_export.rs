use std::path::Path;

use anyhow::{Context, Result};
use chrono::Utc;
use rust_xlsxwriter::{Workbook, Worksheet};

use crate::backtest::{BacktestReport, format_pct};

pub struct ExportSummary {
    pub bets: usize,
    pub summary_rows: usize,
}

pub fn summary_rows(report: &BacktestReport) -> Vec<Vec<String>> {
    vec![
        vec!["Field".to_string(), "Value".to_string()],
        vec!["Generated at".to_string(), Utc::now().to_rfc3339()],
        vec!["League".to_string(), report.league.to_string()],
        vec!["Away or Home".to_string(), report.decision.side.to_string()],
        vec![
            "Favorite or Underdog".to_string(),
            report.decision.favorite.to_string(),
        ],
        vec!["Upsets".to_string(), report.decision.upset.to_string()],
        vec![
            "Discrepancy threshold".to_string(),
            report.decision.threshold.to_string(),
        ],
        vec![
            "Bet amount".to_string(),
            format!("{:.2}", report.decision.bet_amount),
        ],
        vec![
            "Games analyzed".to_string(),
            report.games_analyzed.to_string(),
        ],
        vec!["Games failed".to_string(), report.games_failed.to_string()],
        vec![
            "Bets placed".to_string(),
            report.state.bets_placed.to_string(),
        ],
        vec!["Bets won".to_string(), report.state.bets_won.to_string()],
        vec![
            "Final bankroll".to_string(),
            format!("{:.2}", report.state.bankroll),
        ],
        vec!["Win rate".to_string(), format_pct(report.win_rate())],
        vec!["ROI".to_string(), format_pct(report.roi())],
    ]
}

pub fn bet_rows(report: &BacktestReport) -> Vec<Vec<String>> {
    let mut rows = vec![vec![
        "Event".to_string(),
        "Side".to_string(),
        "Money Line".to_string(),
        "Implied %".to_string(),
        "Predicted %".to_string(),
        "Discrepancy".to_string(),
        "Won".to_string(),
        "Profit".to_string(),
        "Bankroll".to_string(),
    ]];
    for bet in &report.bets {
        rows.push(vec![
            bet.event_id.clone(),
            bet.side.label().to_string(),
            bet.money_line.to_string(),
            format!("{:.3}", bet.implied),
            format!("{:.3}", bet.predicted),
            format!("{:.3}", bet.discrepancy()),
            if bet.won { "yes" } else { "no" }.to_string(),
            format!("{:.2}", bet.profit),
            format!("{:.2}", bet.bankroll_after),
        ]);
    }
    rows
}

pub fn export_ledger(path: &Path, report: &BacktestReport) -> Result<ExportSummary> {
    let summary = summary_rows(report);
    let bets = bet_rows(report);

    let mut workbook = Workbook::new();
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Summary")?;
        write_rows(sheet, &summary)?;
    }
    {
        let sheet = workbook.add_worksheet();
        sheet.set_name("Bets")?;
        write_rows(sheet, &bets)?;
    }

    workbook
        .save(path)
        .with_context(|| format!("failed writing workbook to {}", path.display()))?;

    Ok(ExportSummary {
        bets: bets.len().saturating_sub(1),
        summary_rows: summary.len().saturating_sub(1),
    })
}

fn write_rows(worksheet: &mut Worksheet, rows: &[Vec<String>]) -> Result<()> {
    for (row_idx, row) in rows.iter().enumerate() {
        for (col_idx, value) in row.iter().enumerate() {
            worksheet
                .write_string(row_idx as u32, col_idx as u16, value)
                .with_context(|| format!("write cell ({row_idx},{col_idx})"))?;
        }
    }
    Ok(())
}
