//! The catalog of tools an agent may enable.
//!
//! Tools are declared to the model but not executed: each invocation is answered
//! with a fixed acknowledgement that asks the model to write the content itself.
use serde_json::json;

use crate::models::tool::Tool;

pub const GENERATE_JOB_DESCRIPTION: &str = "generate_job_description";
pub const GENERATE_SEO_CONTENT: &str = "generate_seo_content";

#[derive(Debug, Clone)]
pub struct ToolCatalog {
    tools: Vec<Tool>,
}

impl Default for ToolCatalog {
    fn default() -> Self {
        Self::new(vec![job_description_tool(), seo_content_tool()])
    }
}

impl ToolCatalog {
    pub fn new(tools: Vec<Tool>) -> Self {
        Self { tools }
    }

    pub fn tools(&self) -> &[Tool] {
        &self.tools
    }

    /// Declarations for the enabled subset, in catalog order
    pub fn enabled<S: AsRef<str>>(&self, names: &[S]) -> Vec<Tool> {
        for name in names {
            if !self.tools.iter().any(|t| t.name == name.as_ref()) {
                tracing::debug!(tool = name.as_ref(), "enabled tool is not in the catalog");
            }
        }
        self.tools
            .iter()
            .filter(|tool| names.iter().any(|name| name.as_ref() == tool.name))
            .cloned()
            .collect()
    }
}

/// The canned tool result returned for every invocation of `tool_name`.
pub fn acknowledgement(tool_name: &str) -> String {
    let label = match tool_name {
        GENERATE_JOB_DESCRIPTION => "job description".to_string(),
        GENERATE_SEO_CONTENT => "SEO content".to_string(),
        other => other.replace('_', " "),
    };
    format!(
        "Tool executed successfully. Please now generate the actual {} based on the user's request. Write the complete, formatted content.",
        label
    )
}

fn job_description_tool() -> Tool {
    Tool::new(
        GENERATE_JOB_DESCRIPTION,
        "Generates a comprehensive, well-structured job description based on role requirements, company information, and best practices in recruitment marketing. Outputs formatted text ready for job boards.",
        json!({
            "type": "object",
            "properties": {
                "job_title": {
                    "type": "string",
                    "description": "The title of the position (e.g., 'Senior Software Engineer', 'Marketing Manager')"
                },
                "company": {
                    "type": "string",
                    "description": "Company name"
                },
                "department": {
                    "type": "string",
                    "description": "Department or team the role belongs to"
                },
                "requirements": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "List of required skills, qualifications, and experience"
                },
                "responsibilities": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Key responsibilities and day-to-day tasks"
                },
                "benefits": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Employee benefits and perks"
                },
                "location": {
                    "type": "string",
                    "description": "Job location (e.g., 'San Francisco, CA', 'Remote', 'Hybrid - NYC')"
                },
                "salary_range": {
                    "type": "string",
                    "description": "Salary range or compensation details"
                },
                "employment_type": {
                    "type": "string",
                    "enum": ["full-time", "part-time", "contract", "internship"],
                    "description": "Type of employment"
                }
            },
            "required": ["job_title", "company", "requirements"]
        }),
    )
}

fn seo_content_tool() -> Tool {
    Tool::new(
        GENERATE_SEO_CONTENT,
        "Creates SEO-optimized content specifically for the recruitment industry. Generates blog posts, landing pages, or other content that ranks well and attracts qualified candidates or clients.",
        json!({
            "type": "object",
            "properties": {
                "content_type": {
                    "type": "string",
                    "enum": ["blog_post", "landing_page", "job_listing", "company_page"],
                    "description": "Type of content to generate"
                },
                "target_keywords": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Primary and secondary keywords to target for SEO"
                },
                "industry": {
                    "type": "string",
                    "description": "Specific recruitment industry or niche (e.g., 'tech recruitment', 'healthcare staffing', 'executive search')"
                },
                "word_count": {
                    "type": "number",
                    "description": "Target word count for the content (default: 800)"
                },
                "tone": {
                    "type": "string",
                    "enum": ["professional", "casual", "authoritative", "friendly"],
                    "description": "Desired tone of voice for the content"
                },
                "target_audience": {
                    "type": "string",
                    "description": "Intended audience (e.g., 'job seekers', 'hiring managers', 'HR professionals')"
                }
            },
            "required": ["content_type", "target_keywords", "industry"]
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enabled_filters_and_keeps_catalog_order() {
        let catalog = ToolCatalog::default();
        let enabled = catalog.enabled(&[GENERATE_SEO_CONTENT, "web_search", GENERATE_JOB_DESCRIPTION]);
        let names: Vec<&str> = enabled.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec![GENERATE_JOB_DESCRIPTION, GENERATE_SEO_CONTENT]);
    }

    #[test]
    fn test_no_enabled_tools() {
        let catalog = ToolCatalog::default();
        assert!(catalog.enabled::<&str>(&[]).is_empty());
    }

    #[test]
    fn test_acknowledgement_names_the_tool() {
        assert!(acknowledgement(GENERATE_JOB_DESCRIPTION)
            .contains("generate the actual job description based on"));
        assert!(acknowledgement(GENERATE_SEO_CONTENT).contains("the actual SEO content based"));
        assert!(acknowledgement("salary_benchmark").contains("the actual salary benchmark based"));
    }

    #[test]
    fn test_declarations_carry_schemas() {
        let catalog = ToolCatalog::default();
        for tool in catalog.tools() {
            assert_eq!(tool.input_schema["type"], "object");
            assert!(tool.input_schema["required"].is_array());
        }
    }
}
