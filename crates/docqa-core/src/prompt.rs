use docqa_memory::RetrievedChunk;

const INSTRUCTION: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

/// Build the single-turn question-answering prompt.
///
/// Context chunks are joined by blank lines in retrieval order.
#[must_use]
pub fn build_prompt(context: &[RetrievedChunk], question: &str) -> String {
    let context = context
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{INSTRUCTION}\n\n{context}\n\nQuestion: {question}\nHelpful Answer:")
}
