//! Fixed-width listing lines.

use super::Job;

/// Total width of a listing line.
pub const LINE_WIDTH: usize = 80;

/// Suffix replacing the tail of a command that does not fit.
pub const TRUNCATION_MARKER: &str = " (...)";

const UID_WIDTH: usize = 3;
const STATE_WIDTH: usize = 4;
const EXIT_WIDTH: usize = 4;
const GAP: &str = " ";

/// Header line preceding a listing.
pub const LIST_HEADER: &str = "UID STAT EXIT CMD";

pub(super) fn render_job(job: &Job) -> String {
    let exit = match job.exit_code() {
        Some(code) if job.state().is_terminal() => code.to_string(),
        _ => String::new(),
    };
    // Each fixed column keeps its trailing gap, so a uid wider than its
    // column pushes the rest right instead of running into the state.
    let mut line = format!(
        "{uid:<uid_width$}{GAP}{state:<state_width$}{GAP}{exit:<exit_width$}{GAP}",
        uid = job.uid(),
        state = job.state().abbreviation(),
        uid_width = UID_WIDTH,
        state_width = STATE_WIDTH,
        exit_width = EXIT_WIDTH,
    );
    let width = LINE_WIDTH.saturating_sub(line.chars().count());
    line.push_str(&command_column(job.argv(), width));
    line
}

/// Joins `argv` with spaces, cutting whole words and appending
/// [`TRUNCATION_MARKER`] when the result would exceed `width` characters.
fn command_column(argv: &[String], width: usize) -> String {
    let full = argv.join(" ");
    if full.chars().count() <= width {
        return full;
    }

    let budget = width.saturating_sub(TRUNCATION_MARKER.chars().count());
    let mut column = String::new();
    let mut used = 0;
    for word in full.split(' ') {
        let length = word.chars().count();
        let separator = usize::from(!column.is_empty());
        if used + separator + length > budget {
            if column.is_empty() {
                column.extend(word.chars().take(budget));
            }
            break;
        }
        if separator == 1 {
            column.push(' ');
        }
        column.push_str(word);
        used += separator + length;
    }
    column.push_str(TRUNCATION_MARKER);
    column
}
