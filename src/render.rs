use crate::data::LedgerEntry;
use crate::exclude::REFS_TAG;
use chrono::Datelike;
use rust_decimal::Decimal;

/// Render entries to the output journal, one block per entry separated by a
/// blank line, with a `Y` year directive opening each new year and short
/// month/day dates inside it. Emission order is (date-time, smallest
/// contributing id) so identical inputs always produce byte-identical
/// output, whatever order the export arrived in.
pub(crate) fn write_entries<W: std::io::Write>(
    mut writer: W,
    entries: &[LedgerEntry],
) -> Result<(), anyhow::Error> {
    let mut sorted: Vec<&LedgerEntry> = entries.iter().collect();
    sorted.sort_by_key(|e| (e.when, e.refs.iter().min().copied().unwrap_or(0)));
    let mut year: Option<i32> = None;
    for (i, entry) in sorted.iter().enumerate() {
        if i > 0 {
            writeln!(writer)?;
        }
        if year != Some(entry.when.year()) {
            year = Some(entry.when.year());
            writeln!(writer, "Y{}", entry.when.year())?;
            writeln!(writer)?;
        }
        writer.write_all(render_entry(entry, year).as_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

fn render_entry(entry: &LedgerEntry, year: Option<i32>) -> String {
    let date = if year == Some(entry.when.year()) {
        entry.when.format("%m/%d")
    } else {
        entry.when.format("%Y/%m/%d")
    };
    let mut block = format!("{date} *");
    if let Some(payee) = &entry.payee {
        block.push(' ');
        block.push_str(payee);
    }
    block.push_str(&format!("  ; time: {}\n", entry.when.format("%H:%M:%S")));
    if let Some(note) = &entry.note {
        block.push_str(&format!("    ; note: {note}\n"));
    }
    let refs: Vec<String> = entry.refs.iter().map(|id| id.to_string()).collect();
    block.push_str(&format!("    ; {REFS_TAG} {}\n", refs.join(",")));

    // The format can infer exactly one missing amount in a balanced entry;
    // only lean on that in the plain two-posting case and print everything
    // explicitly otherwise.
    let net: Decimal = entry.postings.iter().map(|p| p.amount).sum();
    let elide_last = entry.postings.len() == 2 && net.is_zero();
    for (i, posting) in entry.postings.iter().enumerate() {
        if elide_last && i == 1 {
            block.push_str(&format!("    {}\n", posting.account));
        } else {
            block.push_str(&format!(
                "    {:<26}  {:>16}\n",
                posting.account,
                format_amount(posting.amount, &entry.currency)
            ));
        }
    }
    block
}

/// Fixed-point rendering with thousands grouping: `$` prefix for USD,
/// currency-code suffix otherwise, sign first.
fn format_amount(amount: Decimal, currency: &str) -> String {
    let mut value = amount.abs();
    value.rescale(2);
    let text = value.to_string();
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));
    let mut grouped = String::new();
    for (i, digit) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(digit);
    }
    let sign = if amount.is_sign_negative() && !amount.is_zero() {
        "-"
    } else {
        ""
    };
    if currency == "USD" {
        format!("{sign}${grouped}.{frac_part}")
    } else {
        format!("{sign}{grouped}.{frac_part} {currency}")
    }
}
