//! Prompt text for the SQL agent

/// Output rules given to the model as the system prompt
const SYSTEM_RULES: &str = "\
You are **ChatDB**, an expert data analyst and front-end developer. \
You have access to a SQL database and can write SELECT statements to answer \
the user's questions. **NEVER** modify data. **Return the answer as a \
COMPLETE, standalone HTML5 document**, beginning with '<!doctype html>'. \
Your page must:
• Include a <head> with <meta charset='utf-8'> and <title>ChatDB Answer</title>.
• Bring in Tailwind CSS via CDN ('https://cdn.tailwindcss.com').
• Respect prefers-color-scheme dark.
• In <body>, present data beautifully. For tabular results, create a <table> \
with Tailwind classes. Add a search input above the table and client-side JS \
to filter rows and allow header-click sorting.
• For single scalar answers, display them inside a centered <div> with \
text-4xl font-bold.
• If no data, show a <p class='text-red-600'>No records found.</p>.
• Place all scripts at the end of <body>. Use vanilla JS (no external libs \
other than Tailwind).
Return **only** the HTML file content, no extra commentary or code fences.";

/// Assistant turn inserted after the question to steer tool use
pub const FUNCTIONS_SUFFIX: &str = "I should look at the tables in the database to see what I can query.  Then I should query the schema of the most relevant tables.";

/// Template for the query checker tool
const QUERY_CHECKER: &str = "\
{query}
Double check the {dialect} query above for common mistakes, including:
- Using NOT IN with NULL values
- Using UNION when UNION ALL should have been used
- Using BETWEEN for exclusive ranges
- Data type mismatch in predicates
- Properly quoting identifiers
- Using the correct number of arguments for functions
- Casting to the correct data type
- Using the proper columns for joins

If there are any of the above mistakes, rewrite the query. If there are no mistakes, just reproduce the original query.

Output the final SQL query only.

SQL Query: ";

/// Build the system prompt for a database dialect
pub fn system_prompt(dialect: &str, top_k: usize) -> String {
    format!(
        "{}\n\nThe database is {}. Unless the user asks for a specific number of \
         rows, limit every query to at most {} results.",
        SYSTEM_RULES, dialect, top_k
    )
}

/// Build the query checker prompt
pub fn query_checker_prompt(query: &str, dialect: &str) -> String {
    QUERY_CHECKER
        .replace("{dialect}", dialect)
        .replace("{query}", query)
}

/// Remove a Markdown code fence wrapped around the whole answer
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return text;
    };
    let Some(body) = rest.strip_suffix("```") else {
        return text;
    };

    // Drop the info string (e.g. "html") on the opening line
    match body.split_once('\n') {
        Some((_, inner)) => inner.trim(),
        None => body.trim(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_prompt_rules() {
        let prompt = system_prompt("sqlite", 10);
        assert!(prompt.contains("<!doctype html>"));
        assert!(prompt.contains("https://cdn.tailwindcss.com"));
        assert!(prompt.contains("prefers-color-scheme dark"));
        assert!(prompt.contains("NEVER"));
        assert!(prompt.contains("The database is sqlite"));
        assert!(prompt.contains("at most 10 results"));
    }

    #[test]
    fn test_query_checker_prompt() {
        let prompt = query_checker_prompt("SELECT * FROM users", "postgresql");
        assert!(prompt.starts_with("SELECT * FROM users\n"));
        assert!(prompt.contains("Double check the postgresql query"));
        assert!(!prompt.contains("{query}"));
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(
            strip_code_fence("```html\n<!doctype html><html></html>\n```"),
            "<!doctype html><html></html>"
        );
        assert_eq!(strip_code_fence("```sql\nSELECT 1\n```\n"), "SELECT 1");
        assert_eq!(strip_code_fence("```SELECT 1```"), "SELECT 1");
    }

    #[test]
    fn test_unfenced_text_is_unchanged() {
        let html = "<!doctype html>\n<html></html>\n";
        assert_eq!(strip_code_fence(html), html);
        assert_eq!(strip_code_fence("```only an opener"), "```only an opener");
    }
}
