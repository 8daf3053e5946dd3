use anyhow::{Result, bail};
use std::collections::HashSet;

use crate::mailer::MailComposer;
use crate::models::Candidate;

/// Session-scoped record of candidates whose email was dispatched.
///
/// Grows monotonically; there is no removal. Reset only by starting a new
/// session, which also discards the analysis result.
#[derive(Debug, Default)]
pub struct SentTracker {
    ids: HashSet<String>,
}

impl SentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Idempotent: marking an already-sent candidate is a no-op.
    pub fn mark_sent(&mut self, id: &str) {
        self.ids.insert(id.to_string());
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Which side of the Rejected / not-Rejected split a batch run walks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewKind {
    Shortlist,
    Rejection,
}

impl ReviewKind {
    fn admits(&self, candidate: &Candidate) -> bool {
        match self {
            ReviewKind::Shortlist => !candidate.category.is_rejection(),
            ReviewKind::Rejection => candidate.category.is_rejection(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ReviewKind::Shortlist => "Shortlist",
            ReviewKind::Rejection => "Rejection",
        }
    }

    pub fn empty_notice(&self) -> &'static str {
        match self {
            ReviewKind::Shortlist => "No pending shortlisted candidates to email.",
            ReviewKind::Rejection => "No pending rejected candidates to email.",
        }
    }
}

/// Candidates still owed an email for this review kind, in result-set order.
/// Already-sent candidates are always excluded. The list view's score sort
/// never applies here.
pub fn pending_candidates(
    candidates: &[Candidate],
    kind: ReviewKind,
    sent: &SentTracker,
) -> Vec<Candidate> {
    candidates
        .iter()
        .filter(|c| kind.admits(c) && !sent.has(&c.id))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Send,
    Skip,
}

/// What `act` did to the queue position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Advanced,
    Completed,
}

/// One batch email review run.
///
/// The items are a snapshot taken at start; the cursor only moves forward;
/// `draft_email` belongs to the item under the cursor and is reseeded from
/// that candidate's extracted address on every advance. The queue itself
/// never holds an empty item list: construction returns None instead.
#[derive(Debug)]
pub struct EmailQueue {
    items: Vec<Candidate>,
    cursor: usize,
    draft_email: String,
    kind: ReviewKind,
    cancel_pending: bool,
}

impl EmailQueue {
    /// Builds a queue from the candidates still pending for `kind`.
    /// Returns None when nothing is pending; the caller surfaces the
    /// "nothing to do" notice and performs no state change.
    pub fn start(candidates: &[Candidate], kind: ReviewKind, sent: &SentTracker) -> Option<Self> {
        let items = pending_candidates(candidates, kind, sent);
        if items.is_empty() {
            return None;
        }
        let draft_email = items[0].email.clone();
        Some(Self {
            items,
            cursor: 0,
            draft_email,
            kind,
            cancel_pending: false,
        })
    }

    pub fn kind(&self) -> ReviewKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// 0-based position of the current item.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn current(&self) -> &Candidate {
        &self.items[self.cursor]
    }

    pub fn is_last(&self) -> bool {
        self.cursor + 1 == self.items.len()
    }

    pub fn draft_email(&self) -> &str {
        &self.draft_email
    }

    /// Replaces the recipient for the current item only. The underlying
    /// candidate record and every other queue item are untouched.
    pub fn edit_draft(&mut self, address: impl Into<String>) {
        self.draft_email = address.into();
    }

    /// Applies a send/skip decision to the current item.
    ///
    /// Send dispatches the draft recipient with the evaluation's subject and
    /// body verbatim, and records the candidate as sent before the cursor
    /// moves. A successful composer handoff is the completion signal;
    /// delivery is not observed. Send with an empty recipient, or a composer
    /// that fails to launch, fails without any state change. Skip touches
    /// nothing.
    pub fn act(
        &mut self,
        decision: Decision,
        sent: &mut SentTracker,
        composer: &dyn MailComposer,
    ) -> Result<StepOutcome> {
        if decision == Decision::Send {
            if self.draft_email.trim().is_empty() {
                bail!("Recipient email is empty. Enter an address or skip this candidate.");
            }
            let candidate = &self.items[self.cursor];
            composer.compose(
                &self.draft_email,
                &candidate.evaluation.email_subject,
                &candidate.evaluation.email_body,
            )?;
            sent.mark_sent(&candidate.id);
        }

        if self.is_last() {
            return Ok(StepOutcome::Completed);
        }
        self.cursor += 1;
        self.draft_email = self.items[self.cursor].email.clone();
        Ok(StepOutcome::Advanced)
    }

    /// First half of the cancel handshake. The queue stays open until the
    /// owner sees a confirmation and drops it; sent marks recorded so far
    /// are never rolled back.
    pub fn request_cancel(&mut self) {
        self.cancel_pending = true;
    }

    pub fn dismiss_cancel(&mut self) {
        self.cancel_pending = false;
    }

    pub fn cancel_pending(&self) -> bool {
        self.cancel_pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateEvaluation, ShortlistingCategory};
    use std::cell::RefCell;

    /// Records compose calls instead of touching the OS.
    #[derive(Default)]
    struct RecordingComposer {
        calls: RefCell<Vec<(String, String, String)>>,
    }

    impl MailComposer for RecordingComposer {
        fn compose(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
            self.calls.borrow_mut().push((
                recipient.to_string(),
                subject.to_string(),
                body.to_string(),
            ));
            Ok(())
        }
    }

    /// A composer whose launch always fails, like a host with no mail client.
    struct FailingComposer;

    impl MailComposer for FailingComposer {
        fn compose(&self, _recipient: &str, _subject: &str, _body: &str) -> Result<()> {
            Err(anyhow::anyhow!("Failed to launch 'xdg-open' to open URL"))
        }
    }

    fn candidate(id: &str, email: &str, category: ShortlistingCategory) -> Candidate {
        Candidate {
            id: id.to_string(),
            name: format!("Candidate {}", id),
            email: email.to_string(),
            score: 75,
            category,
            filename: format!("{}.pdf", id),
            evaluation: CandidateEvaluation {
                summary: "summary".to_string(),
                strengths: vec!["ships fast".to_string()],
                gaps: vec![],
                red_flags: vec![],
                startup_fit: "good".to_string(),
                interview_questions: vec![],
                email_subject: format!("Subject for {}", id),
                email_body: format!("Body for {}", id),
            },
        }
    }

    fn sample_pool() -> Vec<Candidate> {
        vec![
            candidate("a", "a@x.com", ShortlistingCategory::Shortlisted),
            candidate("b", "", ShortlistingCategory::Rejected),
            candidate("c", "c@x.com", ShortlistingCategory::Shortlisted),
        ]
    }

    #[test]
    fn test_mark_sent_idempotent() {
        let mut sent = SentTracker::new();
        sent.mark_sent("a");
        sent.mark_sent("a");
        assert_eq!(sent.len(), 1);
        assert!(sent.has("a"));
        assert!(!sent.has("b"));
    }

    #[test]
    fn test_start_snapshots_filtered_candidates() {
        let pool = sample_pool();
        let sent = SentTracker::new();
        let queue = EmailQueue::start(&pool, ReviewKind::Shortlist, &sent).unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.cursor(), 0);
        assert_eq!(queue.current().id, "a");
        assert_eq!(queue.draft_email(), "a@x.com");
    }

    #[test]
    fn test_start_excludes_sent_candidates() {
        let pool = sample_pool();
        let mut sent = SentTracker::new();
        sent.mark_sent("a");
        let queue = EmailQueue::start(&pool, ReviewKind::Shortlist, &sent).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.current().id, "c");
    }

    #[test]
    fn test_start_empty_filter_yields_none() {
        let pool = vec![candidate("b", "b@x.com", ShortlistingCategory::Rejected)];
        let sent = SentTracker::new();
        assert!(EmailQueue::start(&pool, ReviewKind::Shortlist, &sent).is_none());
    }

    #[test]
    fn test_rejection_review_picks_only_rejected() {
        let pool = sample_pool();
        let sent = SentTracker::new();
        let queue = EmailQueue::start(&pool, ReviewKind::Rejection, &sent).unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.current().id, "b");
        // No extractable address: draft seeds empty, manual entry required.
        assert_eq!(queue.draft_email(), "");
    }

    #[test]
    fn test_send_marks_and_advances_with_reseed() {
        let pool = sample_pool();
        let mut sent = SentTracker::new();
        let composer = RecordingComposer::default();
        let mut queue = EmailQueue::start(&pool, ReviewKind::Shortlist, &sent).unwrap();

        let outcome = queue.act(Decision::Send, &mut sent, &composer).unwrap();
        assert_eq!(outcome, StepOutcome::Advanced);
        assert!(sent.has("a"));
        assert_eq!(queue.cursor(), 1);
        assert_eq!(queue.current().id, "c");
        assert_eq!(queue.draft_email(), "c@x.com");

        let calls = composer.calls.borrow();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "a@x.com");
        assert_eq!(calls[0].1, "Subject for a");
        assert_eq!(calls[0].2, "Body for a");
    }

    #[test]
    fn test_send_uses_edited_draft_not_candidate_record() {
        let pool = sample_pool();
        let mut sent = SentTracker::new();
        let composer = RecordingComposer::default();
        let mut queue = EmailQueue::start(&pool, ReviewKind::Shortlist, &sent).unwrap();

        queue.edit_draft("override@y.com");
        queue.act(Decision::Send, &mut sent, &composer).unwrap();

        assert_eq!(composer.calls.borrow()[0].0, "override@y.com");
        // The source candidate keeps its extracted address.
        assert_eq!(pool[0].email, "a@x.com");
    }

    #[test]
    fn test_edit_does_not_bleed_into_next_item() {
        let pool = sample_pool();
        let mut sent = SentTracker::new();
        let composer = RecordingComposer::default();
        let mut queue = EmailQueue::start(&pool, ReviewKind::Shortlist, &sent).unwrap();

        queue.edit_draft("typed@y.com");
        queue.act(Decision::Skip, &mut sent, &composer).unwrap();
        assert_eq!(queue.draft_email(), "c@x.com");
        assert!(sent.is_empty());
        assert!(composer.calls.borrow().is_empty());
    }

    #[test]
    fn test_send_rejected_when_draft_empty() {
        let pool = vec![candidate("b", "", ShortlistingCategory::Rejected)];
        let mut sent = SentTracker::new();
        let composer = RecordingComposer::default();
        let mut queue = EmailQueue::start(&pool, ReviewKind::Rejection, &sent).unwrap();

        let err = queue.act(Decision::Send, &mut sent, &composer);
        assert!(err.is_err());
        // No state change at all.
        assert_eq!(queue.cursor(), 0);
        assert!(sent.is_empty());
        assert!(composer.calls.borrow().is_empty());

        // Skip stays available as the escape hatch.
        let outcome = queue.act(Decision::Skip, &mut sent, &composer).unwrap();
        assert_eq!(outcome, StepOutcome::Completed);
    }

    #[test]
    fn test_composer_launch_failure_leaves_step_untouched() {
        let pool = sample_pool();
        let mut sent = SentTracker::new();
        let mut queue = EmailQueue::start(&pool, ReviewKind::Shortlist, &sent).unwrap();

        let err = queue.act(Decision::Send, &mut sent, &FailingComposer);
        assert!(err.is_err());
        assert_eq!(queue.cursor(), 0);
        assert!(sent.is_empty());

        // The step stays retryable once a working composer is back.
        let composer = RecordingComposer::default();
        let outcome = queue.act(Decision::Send, &mut sent, &composer).unwrap();
        assert_eq!(outcome, StepOutcome::Advanced);
        assert!(sent.has("a"));
    }

    #[test]
    fn test_whitespace_recipient_counts_as_empty() {
        let pool = vec![candidate("b", "", ShortlistingCategory::Rejected)];
        let mut sent = SentTracker::new();
        let composer = RecordingComposer::default();
        let mut queue = EmailQueue::start(&pool, ReviewKind::Rejection, &sent).unwrap();
        queue.edit_draft("   ");
        assert!(queue.act(Decision::Send, &mut sent, &composer).is_err());
    }

    #[test]
    fn test_last_item_send_completes_and_marks() {
        let pool = sample_pool();
        let mut sent = SentTracker::new();
        let composer = RecordingComposer::default();
        let mut queue = EmailQueue::start(&pool, ReviewKind::Shortlist, &sent).unwrap();

        queue.act(Decision::Skip, &mut sent, &composer).unwrap();
        let outcome = queue.act(Decision::Send, &mut sent, &composer).unwrap();
        assert_eq!(outcome, StepOutcome::Completed);
        assert!(sent.has("c"));
        assert!(!sent.has("a"));
    }

    #[test]
    fn test_last_item_skip_completes_without_marking() {
        let pool = vec![candidate("a", "a@x.com", ShortlistingCategory::Shortlisted)];
        let mut sent = SentTracker::new();
        let composer = RecordingComposer::default();
        let mut queue = EmailQueue::start(&pool, ReviewKind::Shortlist, &sent).unwrap();

        let outcome = queue.act(Decision::Skip, &mut sent, &composer).unwrap();
        assert_eq!(outcome, StepOutcome::Completed);
        assert!(!sent.has("a"));
    }

    #[test]
    fn test_cursor_invariant_holds_while_open() {
        let pool = sample_pool();
        let mut sent = SentTracker::new();
        let composer = RecordingComposer::default();
        let mut queue = EmailQueue::start(&pool, ReviewKind::Shortlist, &sent).unwrap();

        loop {
            assert!(queue.cursor() < queue.len());
            match queue.act(Decision::Skip, &mut sent, &composer).unwrap() {
                StepOutcome::Advanced => continue,
                StepOutcome::Completed => break,
            }
        }
    }

    #[test]
    fn test_cancel_requires_confirmation() {
        let pool = sample_pool();
        let mut sent = SentTracker::new();
        let composer = RecordingComposer::default();
        let mut queue = EmailQueue::start(&pool, ReviewKind::Shortlist, &sent).unwrap();

        queue.act(Decision::Send, &mut sent, &composer).unwrap();

        // Requesting cancel leaves the queue open and steppable.
        queue.request_cancel();
        assert!(queue.cancel_pending());
        assert_eq!(queue.current().id, "c");

        // Dismissing returns to normal stepping.
        queue.dismiss_cancel();
        assert!(!queue.cancel_pending());

        // Confirmed cancel is the owner dropping the queue; progress stays.
        queue.request_cancel();
        drop(queue);
        assert!(sent.has("a"));
    }

    #[test]
    fn test_queue_snapshot_ignores_later_sent_marks() {
        let pool = sample_pool();
        let mut sent = SentTracker::new();
        let composer = RecordingComposer::default();
        let mut queue = EmailQueue::start(&pool, ReviewKind::Shortlist, &sent).unwrap();

        // A mark recorded outside the queue does not shrink the snapshot.
        sent.mark_sent("c");
        assert_eq!(queue.len(), 2);
        queue.act(Decision::Skip, &mut sent, &composer).unwrap();
        assert_eq!(queue.current().id, "c");
    }
}
