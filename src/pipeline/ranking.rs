//! Ranking stage
//!
//! Pure reordering and numbering, no model calls. Stable sorts keep ties in
//! extraction order, which makes the whole stage idempotent.

use crate::model::taxonomy::{Subtopic, Topic};

/// Sort subtopics within each topic and topics overall by descending claim
/// count, then assign claim numbers within every subtopic.
pub fn rank(topics: &mut Vec<Topic>) {
    for topic in topics.iter_mut() {
        topic
            .subtopics
            .sort_by(|a, b| b.claims.len().cmp(&a.claims.len()));
        for subtopic in topic.subtopics.iter_mut() {
            number_claims(subtopic);
        }
    }
    topics.sort_by(|a, b| b.claim_count().cmp(&a.claim_count()));
}

/// Reorder a subtopic's claims by descending quote count (stable) and assign
/// contiguous 1-based numbers in that order.
pub fn number_claims(subtopic: &mut Subtopic) {
    subtopic
        .claims
        .sort_by(|a, b| b.quotes.len().cmp(&a.quotes.len()));
    for (i, claim) in subtopic.claims.iter_mut().enumerate() {
        claim.number = (i + 1) as u32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::claims::{Claim, Quote};
    use crate::model::source::QuoteRef;
    use uuid::Uuid;

    fn quote(text: &str) -> Quote {
        Quote {
            id: Uuid::new_v4(),
            text: text.to_string(),
            reference: QuoteRef {
                source_id: Uuid::new_v4(),
                start_idx: 0,
                end_idx: text.chars().count(),
            },
        }
    }

    fn claim(title: &str, quote_count: usize) -> Claim {
        Claim::new(title, (0..quote_count).map(|_| quote("q")).collect())
    }

    fn subtopic(title: &str, claims: Vec<Claim>) -> Subtopic {
        Subtopic {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: String::new(),
            claims,
        }
    }

    fn topic(title: &str, subtopics: Vec<Subtopic>) -> Topic {
        Topic {
            id: Uuid::new_v4(),
            title: title.to_string(),
            description: String::new(),
            subtopics,
        }
    }

    #[test]
    fn test_rank_orders_by_descending_claim_count() {
        let mut topics = vec![
            topic(
                "small",
                vec![subtopic("one", vec![claim("a", 1)])],
            ),
            topic(
                "large",
                vec![
                    subtopic("few", vec![claim("b", 1)]),
                    subtopic("many", vec![claim("c", 1), claim("d", 1)]),
                ],
            ),
        ];
        rank(&mut topics);

        assert_eq!(topics[0].title, "large");
        assert_eq!(topics[0].subtopics[0].title, "many");
        assert_eq!(topics[0].subtopics[1].title, "few");
    }

    #[test]
    fn test_number_claims_by_descending_quote_count() {
        let mut sub = subtopic(
            "s",
            vec![claim("one quote", 1), claim("three quotes", 3), claim("two quotes", 2)],
        );
        number_claims(&mut sub);

        let order: Vec<(&str, u32)> = sub
            .claims
            .iter()
            .map(|c| (c.title.as_str(), c.number))
            .collect();
        assert_eq!(
            order,
            vec![("three quotes", 1), ("two quotes", 2), ("one quote", 3)]
        );
    }

    #[test]
    fn test_ties_keep_extraction_order() {
        let mut sub = subtopic("s", vec![claim("first", 1), claim("second", 1)]);
        number_claims(&mut sub);
        assert_eq!(sub.claims[0].title, "first");
        assert_eq!(sub.claims[1].title, "second");
    }

    #[test]
    fn test_rank_is_idempotent() {
        let mut topics = vec![
            topic(
                "t1",
                vec![
                    subtopic("a", vec![claim("x", 2), claim("y", 2), claim("z", 1)]),
                    subtopic("b", vec![claim("w", 1)]),
                ],
            ),
            topic("t2", vec![subtopic("c", vec![claim("v", 3)])]),
        ];

        rank(&mut topics);
        let first: Vec<(String, Vec<(String, u32)>)> = snapshot(&topics);
        rank(&mut topics);
        let second = snapshot(&topics);

        assert_eq!(first, second);
    }

    fn snapshot(topics: &[Topic]) -> Vec<(String, Vec<(String, u32)>)> {
        topics
            .iter()
            .map(|t| {
                (
                    t.title.clone(),
                    t.subtopics
                        .iter()
                        .flat_map(|s| s.claims.iter().map(|c| (c.title.clone(), c.number)))
                        .collect(),
                )
            })
            .collect()
    }
}
