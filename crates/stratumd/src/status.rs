//! `stratumd status` output

use colored::{ColoredString, Colorize};
use stratum_cloud::{Phase, ResourceRecord};

pub fn colored_phase(phase: Phase) -> ColoredString {
    let label = phase.to_string();
    match phase {
        Phase::Complete => label.green(),
        Phase::Failed => label.red().bold(),
        Phase::Pending => label.dimmed(),
        Phase::InProgress | Phase::DeleteInProgress => label.yellow(),
        Phase::Deleted => label.blue(),
    }
}

pub fn print_table(records: &[ResourceRecord]) {
    if records.is_empty() {
        println!("{}", "No resource requests".dimmed());
        return;
    }

    let width = records
        .iter()
        .map(|r| r.request.name.len() + usize::from(r.request.deletion_requested))
        .max()
        .unwrap_or(0)
        .max(4);

    println!(
        "{:<width$}  {:<17}  {:<12}  {:<18}  {}",
        "NAME".bold(),
        "KIND".bold(),
        "TIER".bold(),
        "PHASE".bold(),
        "MESSAGE".bold(),
    );
    for record in records {
        let mut name = record.request.name.clone();
        if record.request.deletion_requested {
            name.push('*');
        }
        println!(
            "{:<width$}  {:<17}  {:<12}  {:<18}  {}",
            name,
            record.request.kind.as_str(),
            record.request.tier,
            colored_phase(record.status.phase),
            record.status.message,
        );
    }
}

pub fn print_detail(record: &ResourceRecord) {
    let request = &record.request;
    let status = &record.status;
    let or_dash = |value: &Option<String>| value.clone().unwrap_or_else(|| "-".to_string());

    println!("{} {}", "Name:".bold(), request.name.cyan());
    println!("  Kind:        {}", request.kind);
    println!("  Tier:        {}", request.tier);
    if let Some(primary) = &request.primary_ref {
        println!("  Primary:     {}", primary);
    }
    println!("  Phase:       {}", colored_phase(status.phase));
    println!("  Message:     {}", status.message);
    println!("  Provider:    {}", or_dash(&status.provider));
    println!("  Strategy:    {}", or_dash(&status.strategy));
    println!("  Region:      {}", or_dash(&status.region));
    println!("  External ID: {}", or_dash(&status.external_id));
    println!("  Output:      {}", or_dash(&status.output_ref));
    println!("  Finalizer:   {}", status.finalizer);
    println!("  Deleting:    {}", request.deletion_requested);
    println!("  Version:     {}", record.version);
}
