/// A flat namespace of bindings, kept in binding order.
/// Rebinding a name shadows the earlier binding; lookups see the most recent one.
#[derive(Clone, Debug)]
pub struct Context<T>(Vec<(String, T)>);

impl<T: Clone> Context<T> {
    pub fn empty() -> Context<T> {
        Context(vec![])
    }

    pub fn lookup(&self, v: &str) -> Option<T> {
        for (v0, t) in self.0.iter().rev() {
            if v0 == v {
                return Some(t.clone());
            }
        }
        None
    }

    pub fn bind(&mut self, v: String, t: T) {
        self.0.push((v, t));
    }

    /// The current binding of every name, ordered by first binding.
    pub fn latest(&self) -> Vec<(String, T)> {
        let mut results: Vec<(String, T)> = vec![];
        for (v, t) in &self.0 {
            if let Some(existing) = results.iter_mut().find(|(v0, _t)| v0 == v) {
                existing.1 = t.clone();
            } else {
                results.push((v.clone(), t.clone()));
            }
        }
        results
    }
}

impl<T: std::fmt::Display> std::fmt::Display for Context<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "[")?;
        for (i, (name, v)) in self.0.iter().enumerate() {
            write!(f, "{name} : {v}")?;
            if i + 1 < self.0.len() {
                write!(f, ", ")?;
            }
        }
        write!(f, "]")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_binding_wins() {
        let mut ctx: Context<u32> = Context::empty();
        ctx.bind("a".to_string(), 1);
        ctx.bind("b".to_string(), 2);
        ctx.bind("a".to_string(), 3);

        assert_eq!(ctx.lookup("a"), Some(3));
        assert_eq!(ctx.lookup("b"), Some(2));
        assert_eq!(ctx.lookup("c"), None);
        assert_eq!(ctx.latest(), vec![("a".to_string(), 3), ("b".to_string(), 2)]);
        assert_eq!(ctx.to_string(), "[a : 1, b : 2, a : 3]");
    }
}
