//! Prompts for the pipeline stages

/// Shared system prompt for every model call.
pub const SYSTEM_PROMPT: &str = r#"You are a professional research assistant. You have helped run many public consultations,
surveys and citizen assemblies. You have good instincts when it comes to extracting interesting insights.
You are familiar with public consultation tools like Pol.is and you understand the benefits
for working with very clear, concise claims that other people would be able to vote on."#;

const TAXONOMY_PROMPT: &str = r#"I will give you a list of comments.
Please propose a way to organize the information contained in these comments into topics and subtopics of interest.
Propose between 3 and 12 topics, each with 1 to 6 subtopics.
Keep the topic and subtopic names very concise and use the short description to explain what the topic is about.

Return a JSON object of the form {
  "taxonomy": [
    {
      "topicName": string,
      "topicShortDescription": string,
      "subtopics": [
        {
          "subtopicName": string,
          "subtopicShortDescription": string
        },
        ...
      ]
    },
    ...
  ]
}
Now here is the list of comments:"#;

const CLAIMS_PROMPT: &str = r#"I'm going to give you a comment made by a participant and a list of topics and subtopics which have already been extracted.
I want you to extract a list of concise claims that the participant may support.
We are only interested in claims that can be mapped to one of the given topic and subtopic.
The claim must be fairly general but not a platitude.
It must be something that other people may potentially disagree with. Each claim must also be atomic.
For each claim, please also provide one or more relevant quotes from the comment.
Every quote must be copied verbatim from the comment: an exact, contiguous substring with no added or removed characters.
The quote must be as concise as possible while still supporting the claim.
It could also be a personal story or anecdote illustrating why the participant would make this claim.
For each quote, report startIdx and endIdx: the half-open character offsets of the quote within the comment.
Return a JSON object of the form {
  "claims": [
    {
      "claim": string, // a very concise extracted claim
      "quotes": [
        {
          "quote": string, // the exact quote
          "startIdx": number, // character offset where the quote begins
          "endIdx": number // character offset just past the quote's end
        }
      ],
      "topicName": string, // from the given list of topics
      "subtopicName": string // from the list of subtopics
    },
    ...
  ]
}
If the comment contains no claims that fit the taxonomy, return {"claims": []}.

Now here is the list of topics/subtopics:"#;

const DEDUP_PROMPT: &str = r#"I'm going to give you a list of claims with some ids.
I want you to remove any near-duplicate claims from the list by nesting some claims under some top-level claims.
For example, if we have 5 claims and claim 3 and 5 are similar to claim 2, we will nest claim 3 and 5 under claim 2.
The nesting will be represented as a JSON object where the keys are the ids of the
top-level claims and the values are lists of ids of the nested claims.

Return a JSON object of the form {
  "nesting": {
    "claimId1": [],
    "claimId2": ["claimId3", "claimId5"],
    "claimId4": []
  }
}

And now, here are the claims:"#;

/// Taxonomy prompt over the selected corpus texts.
pub fn build_taxonomy_prompt<'a>(comments: impl Iterator<Item = &'a str>) -> String {
    let mut prompt = String::from(TAXONOMY_PROMPT);
    for comment in comments {
        prompt.push('\n');
        prompt.push_str(comment);
    }
    prompt
}

/// Corrective follow-up after a taxonomy response failed validation.
pub fn build_taxonomy_retry_prompt(original_prompt: &str, validation_error: &str) -> String {
    format!(
        "{original_prompt}\n\n\
         Your previous answer could not be used: {validation_error}\n\
         Please answer again, returning only a JSON object that exactly matches the requested form."
    )
}

/// Claims prompt: taxonomy context plus one comment.
pub fn build_claims_prompt(taxonomy_json: &str, comment: &str) -> String {
    format!("{CLAIMS_PROMPT}\n{taxonomy_json}\nAnd then here is the comment:\n{comment}")
}

/// Deduplication prompt over one subtopic's claim titles.
pub fn build_dedup_prompt(claims: &[String]) -> String {
    let mut prompt = String::from(DEDUP_PROMPT);
    for (i, claim) in claims.iter().enumerate() {
        prompt.push_str(&format!("\nclaimId{}: {}", i, claim));
    }
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_taxonomy_prompt_appends_comments_in_order() {
        let comments = ["I love AI", "AI is scary"];
        let prompt = build_taxonomy_prompt(comments.iter().copied());
        let love = prompt.find("I love AI").unwrap();
        let scary = prompt.find("AI is scary").unwrap();
        assert!(love < scary);
    }

    #[test]
    fn test_dedup_prompt_labels_claims_by_index() {
        let claims = vec!["Cats are great".to_string(), "Dogs are great".to_string()];
        let prompt = build_dedup_prompt(&claims);
        assert!(prompt.contains("claimId0: Cats are great"));
        assert!(prompt.contains("claimId1: Dogs are great"));
    }

    #[test]
    fn test_retry_prompt_carries_validation_error() {
        let retry = build_taxonomy_retry_prompt("original", "expected 3-12 topics, got 1");
        assert!(retry.contains("original"));
        assert!(retry.contains("expected 3-12 topics, got 1"));
    }
}
