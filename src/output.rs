//! Output formatting for search results: grep-style colored text or JSON
//! lines.

use std::io::{self, Write};

use termcolor::{Color, ColorSpec, StandardStream, WriteColor};

use crate::search::grouper::MatchResult;

/// Byte offset of the `cp`-th codepoint in `s` (or the end).
fn codepoint_to_byte(s: &str, cp: usize) -> usize {
    s.char_indices().nth(cp).map(|(i, _)| i).unwrap_or(s.len())
}

/// Print one result in grep style. Each context entry (one per distinct
/// file identity under the path) prints its before-context, the matched
/// line with the match span highlighted, and its after-context.
pub fn print_match(stdout: &mut StandardStream, result: &MatchResult) -> io::Result<()> {
    for ctx in &result.context {
        let Some(primary) = ctx.paths.first() else {
            continue;
        };
        let label = format!("{}:{}", primary.ref_name, primary.path);

        // context_before is nearest-first; print farthest first
        for (i, content) in ctx.context_before.iter().enumerate().rev() {
            let lineno = ctx.line_number - (i as u32 + 1);
            print_context_line(stdout, &label, lineno, content)?;
        }

        print_match_line(stdout, &label, ctx.line_number, result)?;

        for (i, content) in ctx.context_after.iter().enumerate() {
            let lineno = ctx.line_number + (i as u32 + 1);
            print_context_line(stdout, &label, lineno, content)?;
        }

        // the same physical match may exist under other refs
        for extra in &ctx.paths[1..] {
            stdout.set_color(ColorSpec::new().set_fg(Some(Color::Cyan)))?;
            writeln!(stdout, "  also {}:{}", extra.ref_name, extra.path)?;
            stdout.reset()?;
        }
    }
    Ok(())
}

fn print_context_line(
    stdout: &mut StandardStream,
    label: &str,
    lineno: u32,
    content: &str,
) -> io::Result<()> {
    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
    write!(stdout, "{}", label)?;
    stdout.reset()?;
    write!(stdout, "-")?;
    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
    write!(stdout, "{}", lineno)?;
    stdout.reset()?;
    writeln!(stdout, "-{}", content)
}

fn print_match_line(
    stdout: &mut StandardStream,
    label: &str,
    lineno: u32,
    result: &MatchResult,
) -> io::Result<()> {
    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Magenta)))?;
    write!(stdout, "{}", label)?;
    stdout.reset()?;
    write!(stdout, ":")?;
    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Green)))?;
    write!(stdout, "{}", lineno)?;
    stdout.reset()?;
    write!(stdout, ":")?;

    let line = &result.line;
    let start = codepoint_to_byte(line, result.match_left);
    let end = codepoint_to_byte(line, result.match_right);

    write!(stdout, "{}", &line[..start])?;
    stdout.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
    write!(stdout, "{}", &line[start..end])?;
    stdout.reset()?;
    writeln!(stdout, "{}", &line[end..])
}

/// Print one result as a JSON object on its own line.
pub fn print_json(out: &mut impl Write, result: &MatchResult) -> io::Result<()> {
    serde_json::to_writer(&mut *out, result)?;
    writeln!(out)
}
