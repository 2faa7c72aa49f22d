//! Terminal rendering of store summaries and assistant replies.

use std::io::Write;

use varlens_chat::{
    ChatError, ChatMessage, LiteratureResult, Message, QueryResult, StreamObserver, ToolPhase,
};
use varlens_core::types::{
    AggregatedPhenotypeResults, LiteratureResults, LoadStatus, ScreeningResponse, StoreKind,
};
use varlens_store::{AnalysisWorkspace, StoreSnapshot};

/// One line per store, in a fixed order.
pub fn results_summary(workspace: &AnalysisWorkspace) -> String {
    [
        store_line(StoreKind::Screening, &workspace.screening(), describe_screening),
        store_line(StoreKind::Phenotype, &workspace.phenotype(), describe_phenotype),
        store_line(StoreKind::Literature, &workspace.literature(), describe_literature),
    ]
    .join("\n")
}

fn store_line<T>(
    kind: StoreKind,
    snapshot: &StoreSnapshot<T>,
    describe: fn(&T) -> String,
) -> String {
    let detail = match (&snapshot.status, &snapshot.data, &snapshot.failure) {
        (LoadStatus::Loaded, Some(data), _) => describe(data),
        (LoadStatus::Error, _, Some(failure)) => failure.to_string(),
        (status, _, _) => status.to_string(),
    };
    format!("{:<11} {}", format!("{}:", kind), detail)
}

fn describe_screening(data: &ScreeningResponse) -> String {
    match &data.summary {
        Some(summary) => format!(
            "{} variants screened, {} flagged",
            summary.total_variants, summary.flagged_variants
        ),
        None => format!("{} variants", data.results.len()),
    }
}

fn describe_phenotype(data: &AggregatedPhenotypeResults) -> String {
    format!(
        "{} matches across {} phenotype terms",
        data.results.len(),
        data.patient_phenotypes.len()
    )
}

fn describe_literature(data: &LiteratureResults) -> String {
    format!("{} articles ({} total)", data.articles.len(), data.total)
}

fn describe_query(result: &QueryResult) -> String {
    let mut line = format!(
        "[query returned {} rows in {:.1} ms]",
        result.rows_returned, result.execution_time_ms
    );
    if let Some(summary) = &result.summary {
        line.push(' ');
        line.push_str(summary);
    }
    line
}

fn describe_literature_result(result: &LiteratureResult) -> String {
    let total = result.total.unwrap_or(result.articles.len() as u64);
    let mut line = format!("[found {} articles]", total);
    if let Some(summary) = &result.summary {
        line.push(' ');
        line.push_str(summary);
    }
    line
}

/// Render a finished transcript entry.
pub fn render_message(entry: &ChatMessage) -> String {
    match &entry.message {
        Message::User { content } => format!("> {}", content),
        Message::Assistant { content, .. } => content.clone(),
        Message::QueryResult(result) => describe_query(result),
        Message::LiteratureResult(result) => describe_literature_result(result),
    }
}

/// Streams a reply to a writer as it arrives.
///
/// Write errors are dropped; a closed stdout must not abort the stream.
pub struct ConsoleObserver<W: Write> {
    out: W,
}

impl<W: Write> ConsoleObserver<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> StreamObserver for ConsoleObserver<W> {
    fn on_token(&mut self, text: &str) {
        let _ = write!(self.out, "{}", text);
        let _ = self.out.flush();
    }

    fn on_tool_phase(&mut self, phase: ToolPhase) {
        let _ = writeln!(self.out, "\n[{}...]", phase);
    }

    fn on_query_result(&mut self, result: &QueryResult) {
        let _ = writeln!(self.out, "{}", describe_query(result));
    }

    fn on_literature_result(&mut self, result: &LiteratureResult) {
        let _ = writeln!(self.out, "{}", describe_literature_result(result));
    }

    fn on_round_complete(&mut self, _round: usize) {
        let _ = writeln!(self.out);
    }

    fn on_complete(&mut self) {
        let _ = self.out.flush();
    }

    fn on_error(&mut self, error: &ChatError) {
        let _ = writeln!(self.out, "\n[reply interrupted: {}]", error);
    }
}
