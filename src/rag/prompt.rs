use crate::store::Document;

const INSTRUCTIONS: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

/// "Stuff" prompt: every retrieved passage goes into the context verbatim.
pub fn build_prompt(passages: &[&Document], question: &str) -> String {
    let context = passages
        .iter()
        .map(|doc| doc.content.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{INSTRUCTIONS}\n\n{context}\n\nQuestion: {question}\nHelpful Answer:")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::doc;

    #[test]
    fn includes_passages_in_order_and_question() {
        let a = doc("Napa: paracetamol 500 mg");
        let b = doc("Seclo: omeprazole 20 mg");
        let prompt = build_prompt(&[&a, &b], "What is Napa?");

        assert!(prompt.starts_with("Use the following pieces of context"));
        let napa = prompt.find("Napa: paracetamol").unwrap();
        let seclo = prompt.find("Seclo: omeprazole").unwrap();
        assert!(napa < seclo);
        assert!(prompt.contains("\n\nNapa: paracetamol 500 mg\n\nSeclo: omeprazole 20 mg\n\n"));
        assert!(prompt.ends_with("Question: What is Napa?\nHelpful Answer:"));
    }

    #[test]
    fn no_passages_still_asks_question() {
        let prompt = build_prompt(&[], "What is Napa?");
        assert!(prompt.contains("don't try to make up an answer"));
        assert!(prompt.ends_with("Question: What is Napa?\nHelpful Answer:"));
    }
}
