use crate::models::profile::DatasetProfile;

/// The analysis script surface advertised to the model. Kept verbatim in
/// every prompt so completions stay inside the sandbox's vocabulary.
const OPERATIONS_REFERENCE: &str = r#"Available statements (one per line, `#` starts a comment):
- print(<expression>)            write a value to the output
- df = <table expression>        rebind the table for later lines
- plt.bar("labels", "values")    draw a bar chart from two columns
- plt.line("x", "y")             draw a line chart
- plt.scatter("x", "y")          draw a scatter chart
- plt.hist("column")             draw a histogram (optional bin count: plt.hist("col", 20))
- plt.title("text")              title the current chart

Table expressions chain methods on df:
- df.filter("column", "<op>", value)   op is one of == != > < >= <= ; value is a number or "string"
- df.sort("column")  or  df.sort("column", "desc")
- df.select("col_a", "col_b")
- df.head(n)
- df.group_count("column")
- df.group_mean("by", "column") / group_sum / group_min / group_max

Scalar expressions end a chain:
- df.mean("column") / sum / min / max / median / std
- df.count()      row count
- df.shape()      "(rows, columns)"
- df.columns()    column names"#;

/// Compose the single completion request for one query.
///
/// The template is fixed: no branching on query content, and identical
/// (profile, query) inputs always produce the identical prompt string.
pub fn compose(profile: &DatasetProfile, query: &str) -> String {
    format!(
        r#"You are a data analyst. You work with a single table called `df`.

The table:
- Shape: {shape}
- Columns (name: type):
{dtypes}
- Summary statistics:
{summaries}
- Sample rows: {sample}

Write a short analysis script that answers the user's query, using only the
operations listed below. Use print(...) for textual answers and plt.* for a
chart when the query asks for one.

{operations}

User query: "{query}"

Only return the script in a single fenced code block. Do not include any
text outside the code block."#,
        shape = profile.shape_text,
        dtypes = profile.dtype_lines(),
        summaries = profile.summary_lines(),
        sample = profile.sample_rows,
        operations = OPERATIONS_REFERENCE,
        query = query,
    )
}
