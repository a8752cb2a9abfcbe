use console::Style;
use sessalign_core::align::{SearchSpace, SessionSearch};
use sessalign_core::pipeline::{AccessEvent, ExportReport};
use sessalign_core::session::{ParameterSet, Session};

struct Styles {
    title: Style,
    header: Style,
    label: Style,
    value: Style,
    reference: Style,
    warning: Style,
    path: Style,
}

impl Styles {
    fn new() -> Self {
        Self {
            title: Style::new().cyan().bold(),
            header: Style::new().cyan().bold(),
            label: Style::new().dim(),
            value: Style::new().bold().white(),
            reference: Style::new().green(),
            warning: Style::new().yellow(),
            path: Style::new().underlined(),
        }
    }
}

fn print_title(s: &Styles, title: &str) {
    println!();
    println!("  {}", s.title.apply_to(title));
    println!(
        "  {}",
        s.title.apply_to("\u{2550}".repeat(title.chars().count()))
    );
    println!();
}

/// Table of every session's transform, reference first marked.
pub fn print_parameters(params: &ParameterSet, sessions: &[Session]) {
    let s = Styles::new();
    print_title(&s, "Alignment Parameters");

    println!(
        "  {:<30}{:>9}{:>9}{:>10}{:>9}",
        s.header.apply_to("Session"),
        s.header.apply_to("dx"),
        s.header.apply_to("dy"),
        s.header.apply_to("rot\u{b0}"),
        s.header.apply_to("scale")
    );
    for session in sessions {
        if params.is_reference(&session.name) {
            println!(
                "  {:<30}{}",
                session.name,
                s.reference.apply_to("reference")
            );
            continue;
        }
        let p = params.get(&session.name);
        println!(
            "  {:<30}{:>9}{:>9}{:>10}{:>9}",
            session.name,
            s.value.apply_to(format!("{:.2}", p.shift_x)),
            s.value.apply_to(format!("{:.2}", p.shift_y)),
            s.value.apply_to(format!("{:.2}", p.rotation_deg)),
            s.value.apply_to(format!("{:.4}", p.scale))
        );
    }
    println!();
}

pub fn print_search_space(space: &SearchSpace) {
    let s = Styles::new();
    println!("  {}", s.header.apply_to("Search Space"));
    for (name, axis) in [
        ("Shift X", &space.shift_x),
        ("Shift Y", &space.shift_y),
        ("Rotation", &space.rotation),
        ("Scale", &space.scale),
    ] {
        println!("    {:<12}{}", s.label.apply_to(name), s.value.apply_to(axis));
    }
    println!(
        "    {:<12}{}",
        s.label.apply_to("Points"),
        s.value.apply_to(space.point_count())
    );
}

pub fn print_search_results(results: &[SessionSearch]) {
    let s = Styles::new();
    print_title(&s, "Search Results");

    for result in results {
        match result.result {
            Ok(ref outcome) => println!(
                "  {:<30}{}  {}",
                result.session,
                s.value.apply_to(format!("score {:.4}", outcome.score)),
                s.label.apply_to(outcome.params)
            ),
            Err(ref e) => println!(
                "  {:<30}{}",
                result.session,
                s.warning.apply_to(format!("failed: {}", e))
            ),
        }
    }
    println!();
}

pub fn print_export_report(report: &ExportReport) {
    let s = Styles::new();
    print_title(&s, "Export");

    for session in &report.sessions {
        let mode = if session.transformed {
            s.value.apply_to("aligned".to_string())
        } else {
            s.reference.apply_to("reference".to_string())
        };
        println!(
            "  {:<30}{:>7} frames  {}  {}",
            session.session,
            session.frames,
            mode,
            s.label.apply_to(session.tier)
        );
        if session.repaired_rows > 0 {
            println!(
                "    {:<12}{}",
                s.label.apply_to("Repaired"),
                s.value.apply_to(format!("{} rows", session.repaired_rows))
            );
        }
    }

    for event in &report.events {
        match event {
            AccessEvent::Degraded { session, reason } => println!(
                "  {} {}: {}",
                s.warning.apply_to("Memory mapping unavailable for"),
                session,
                s.label.apply_to(reason)
            ),
        }
    }

    println!();
    println!(
        "  {:<14}{}",
        s.label.apply_to("Frames"),
        s.value.apply_to(report.frames_written)
    );
    println!(
        "  {:<14}{}",
        s.label.apply_to("Output"),
        s.path.apply_to(report.output.display())
    );
    println!();
}
