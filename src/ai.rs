use anyhow::{Context, Result, anyhow};
use base64::Engine;
use serde::Deserialize;
use serde_json::{Value, json};
use std::env;
use std::path::Path;

use crate::models::{AnalysisResult, JobContext};

// --- Provider trait ---

pub trait AnalysisProvider: Send + Sync {
    fn analyze(&self, job: &JobContext, files: &[ResumeFile]) -> Result<AnalysisResult>;
    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub model_id: String,
    pub short_name: String,
}

pub fn resolve_model(name: &str) -> Result<ModelSpec> {
    match name {
        "flash" | "gemini-flash" => Ok(ModelSpec {
            model_id: "gemini-2.5-flash".to_string(),
            short_name: "flash".to_string(),
        }),
        "pro" | "gemini-pro" => Ok(ModelSpec {
            model_id: "gemini-2.5-pro".to_string(),
            short_name: "pro".to_string(),
        }),
        "flash-lite" => Ok(ModelSpec {
            model_id: "gemini-2.5-flash-lite".to_string(),
            short_name: "flash-lite".to_string(),
        }),
        _ => Err(anyhow!(
            "Unknown model '{}'. Available: flash (default), pro, flash-lite",
            name
        )),
    }
}

pub fn create_provider(spec: &ModelSpec) -> Result<Box<dyn AnalysisProvider>> {
    let provider = GeminiProvider::new(spec.model_id.clone())?;
    Ok(Box::new(provider))
}

// --- Resume files ---

/// One uploaded resume document, ready for inline transport.
#[derive(Debug, Clone)]
pub struct ResumeFile {
    pub filename: String,
    pub data: Vec<u8>,
    pub media_type: String,
}

impl ResumeFile {
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("Failed to read resume file: {}", path.display()))?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());
        let media_type = detect_media_type(&filename).to_string();
        Ok(Self {
            filename,
            data,
            media_type,
        })
    }
}

pub fn detect_media_type(filename: &str) -> &'static str {
    let lower = filename.to_lowercase();
    if lower.ends_with(".txt") || lower.ends_with(".md") {
        "text/plain"
    } else if lower.ends_with(".doc") || lower.ends_with(".docx") {
        "application/msword"
    } else {
        // The analysis service handles PDF natively; default like a browser would.
        "application/pdf"
    }
}

/// Preconditions checked before any network call.
pub fn validate_inputs(job: &JobContext, files: &[ResumeFile]) -> Result<()> {
    if files.is_empty() {
        return Err(anyhow!("Please provide at least one resume file"));
    }
    if job.description.trim().is_empty() {
        return Err(anyhow!("Job description is required"));
    }
    Ok(())
}

// --- Gemini provider ---

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

#[derive(Debug)]
pub struct GeminiProvider {
    api_key: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl GeminiProvider {
    pub fn new(model_id: String) -> Result<Self> {
        let api_key = env::var("GEMINI_API_KEY").context(
            "GEMINI_API_KEY environment variable not set. Set it with: export GEMINI_API_KEY=your-key-here",
        )?;
        let client = reqwest::blocking::Client::new();
        Ok(Self {
            api_key,
            model_id,
            client,
        })
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    candidates: Vec<ResponseCandidate>,
}

#[derive(Debug, Deserialize)]
struct ResponseCandidate {
    content: ResponseContent,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: String,
}

impl AnalysisProvider for GeminiProvider {
    fn analyze(&self, job: &JobContext, files: &[ResumeFile]) -> Result<AnalysisResult> {
        validate_inputs(job, files)?;

        let url = format!("{}/{}:generateContent", GEMINI_API_BASE, self.model_id);
        let request = build_request(job, files);

        let response = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .context("Failed to send request to the Gemini API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!(
                "Gemini API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let api_response: GenerateContentResponse = response
            .json()
            .context("Failed to parse Gemini API response")?;

        let text = api_response
            .candidates
            .first()
            .and_then(|c| c.content.parts.first())
            .map(|p| p.text.as_str())
            .ok_or_else(|| anyhow!("No content in Gemini API response"))?;

        parse_analysis(text)
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

/// Strict parse of the analysis payload. Any missing required field, unknown
/// category, or out-of-range score is a malformed response, never a partial
/// success.
pub fn parse_analysis(text: &str) -> Result<AnalysisResult> {
    let result: AnalysisResult =
        serde_json::from_str(text).context("Malformed analysis response")?;
    validate_result(&result)?;
    Ok(result)
}

fn validate_result(result: &AnalysisResult) -> Result<()> {
    if result.summary.recommended_cutoff > 100 {
        return Err(anyhow!(
            "Malformed analysis response: recommended cutoff {} out of range",
            result.summary.recommended_cutoff
        ));
    }
    for candidate in &result.candidates {
        if candidate.score > 100 {
            return Err(anyhow!(
                "Malformed analysis response: score {} out of range for candidate '{}'",
                candidate.score,
                candidate.id
            ));
        }
    }
    Ok(())
}

fn build_request(job: &JobContext, files: &[ResumeFile]) -> Value {
    let mut parts = vec![json!({ "text": build_prompt(job, files) })];
    for file in files {
        parts.push(json!({
            "inlineData": {
                "mimeType": file.media_type,
                "data": base64::engine::general_purpose::STANDARD.encode(&file.data),
            }
        }));
    }

    json!({
        "systemInstruction": { "parts": [{ "text": system_instruction(job) }] },
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": response_schema(),
            "temperature": 0.4,
        },
    })
}

fn build_prompt(job: &JobContext, files: &[ResumeFile]) -> String {
    let file_list = files
        .iter()
        .enumerate()
        .map(|(i, f)| format!("{}. {}", i + 1, f.filename))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        "Role Title: {}\n\n\
        Job Description:\n{}\n\n\
        Startup Context:\n{}\n\n\
        Analyze the attached resume files. Map the filename to the analysis.\n\n\
        Attached Files:\n{}",
        job.role_title, job.description, job.startup_context, file_list
    )
}

fn system_instruction(job: &JobContext) -> String {
    format!(
        "You are an expert startup hiring manager and recruitment strategist.\n\
        Your role is to help early-stage, resource-constrained startups process job applications.\n\n\
        Context:\n\
        - Company Type: Early-stage / Bootstrapped Startup\n\
        - Hiring Urgency: High\n\
        - Bias Awareness: Prioritize skills, potential, and real-world ability over pedigree.\n\n\
        Responsibilities:\n\
        1. Analyze the Job Description and Startup Context.\n\
        2. Process the provided resumes (PDFs/Text).\n\
        3. Detect duplicate resumes (same person).\n\
        4. Extract Candidate Name and Email Address from the resume. If email is missing, return an empty string.\n\
        5. Score each candidate (0-100%) based on skill match and startup fit (ownership, adaptability, speed of learning).\n\
        6. Categorize candidates: Strongly Shortlisted, Shortlisted, Backup, Rejected.\n\
        7. Generate insights: Strengths, Gaps, Red Flags.\n\
        8. Create 3-5 specific interview questions.\n\
        9. Draft the email content based on the Category strictly using the templates below.\n\n\
        EMAIL GENERATION RULES:\n\
        You must generate the 'emailSubject' and 'emailBody' fields using the exact templates below.\n\
        Replace [Candidate Name] with the candidate's actual name.\n\
        Replace [Job Role] with the analyzed Role Title.\n\
        The Company Name is \"{company}\".\n\n\
        TEMPLATE A (For categories: Strongly Shortlisted, Shortlisted, Backup):\n\
        Subject: Shortlisted for [Job Role] \u{2013} {company}\n\
        Body:\n\
        Hi [Candidate Name],\n\n\
        Thank you for applying to the [Job Role] position at {company}.\n\n\
        After reviewing your profile, we are pleased to inform you that your application has been shortlisted. We were impressed by your skills and experience relevant to this role.\n\n\
        As the next step in our hiring process, we would like you to proceed with a short assignment / technical discussion. Further details regarding this step will be shared with you shortly.\n\n\
        We appreciate the time and effort you put into your application and look forward to connecting with you.\n\n\
        Best of luck!\n\n\
        Warm regards,\n\
        Hiring Team\n\
        {company}\n\n\
        TEMPLATE B (For category: Rejected):\n\
        Subject: Update on Your Application \u{2013} {company}\n\
        Body:\n\
        Hi [Candidate Name],\n\n\
        Thank you for taking the time to apply for the [Job Role] position at {company} and for your interest in being part of our team.\n\n\
        After careful consideration, we regret to inform you that your profile does not match our current requirements for this role.\n\n\
        We truly appreciate your interest and effort, and we encourage you to apply for future opportunities with us that align with your skills and experience.\n\n\
        We wish you all the very best in your career journey.\n\n\
        Kind regards,\n\
        Hiring Team\n\
        {company}\n\n\
        Constraints:\n\
        - Do NOT penalize for lack of brand-name companies.\n\
        - Focus on transferable skills.\n\
        - Be realistic.",
        company = job.company,
    )
}

fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "summary": {
                "type": "OBJECT",
                "properties": {
                    "processedCount": { "type": "INTEGER" },
                    "duplicateCount": { "type": "INTEGER" },
                    "shortlistedCount": { "type": "INTEGER" },
                    "rejectedCount": { "type": "INTEGER" },
                    "recommendedCutoff": { "type": "INTEGER" },
                },
                "required": ["processedCount", "duplicateCount", "shortlistedCount", "rejectedCount", "recommendedCutoff"],
            },
            "candidates": {
                "type": "ARRAY",
                "items": {
                    "type": "OBJECT",
                    "properties": {
                        "id": { "type": "STRING" },
                        "name": { "type": "STRING" },
                        "email": { "type": "STRING" },
                        "score": { "type": "INTEGER" },
                        "category": {
                            "type": "STRING",
                            "enum": ["Strongly Shortlisted", "Shortlisted", "Backup", "Rejected"],
                        },
                        "filename": { "type": "STRING" },
                        "evaluation": {
                            "type": "OBJECT",
                            "properties": {
                                "summary": { "type": "STRING" },
                                "strengths": { "type": "ARRAY", "items": { "type": "STRING" } },
                                "gaps": { "type": "ARRAY", "items": { "type": "STRING" } },
                                "redFlags": { "type": "ARRAY", "items": { "type": "STRING" } },
                                "startupFit": { "type": "STRING" },
                                "interviewQuestions": { "type": "ARRAY", "items": { "type": "STRING" } },
                                "emailSubject": { "type": "STRING" },
                                "emailBody": { "type": "STRING" },
                            },
                            "required": ["summary", "strengths", "gaps", "redFlags", "startupFit", "interviewQuestions", "emailSubject", "emailBody"],
                        },
                    },
                    "required": ["id", "name", "email", "score", "category", "filename", "evaluation"],
                },
            },
        },
        "required": ["summary", "candidates"],
    })
}
