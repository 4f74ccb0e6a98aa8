use tagsift_upstream::Post;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScanLimits {
	pub local_page_size: usize,
	pub max_empty_pages: u32,
}
impl ScanLimits {
	pub fn from_config(search: &tagsift_config::Search) -> Self {
		Self { local_page_size: search.local_page_size, max_empty_pages: search.max_empty_pages }
	}
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ScanStop {
	/// At least one client page worth of matches has been collected.
	Filled,
	/// The consecutive-empty-page budget ran out.
	Exhausted,
}

/// Accumulator threaded through a scan, one upstream page per step.
#[derive(Clone, Debug, PartialEq)]
pub struct ScanState {
	/// Next upstream page to fetch.
	pub cursor: u32,
	pub collected: Vec<Post>,
	pub empty_pages: u32,
	/// Last upstream page that returned any posts.
	pub last_real_page: Option<u32>,
}
impl ScanState {
	pub fn start(cursor: u32, seed: Vec<Post>) -> Self {
		Self { cursor, collected: seed, empty_pages: 0, last_real_page: None }
	}

	pub fn stop(&self, limits: &ScanLimits) -> Option<ScanStop> {
		if self.collected.len() >= limits.local_page_size {
			Some(ScanStop::Filled)
		} else if self.empty_pages >= limits.max_empty_pages {
			Some(ScanStop::Exhausted)
		} else {
			None
		}
	}

	/// Folds the upstream page fetched at `self.cursor` into the state.
	pub fn advance(
		mut self,
		page: Vec<Post>,
		secondary: &[String],
		limits: &ScanLimits,
	) -> (Self, Option<ScanStop>) {
		if page.is_empty() {
			self.empty_pages += 1;
		} else {
			self.empty_pages = 0;
			self.last_real_page = Some(self.cursor);
			self.collected.extend(page.into_iter().filter(|post| post.has_all_tags(secondary)));
		}

		self.cursor = self.cursor.saturating_add(1);

		let stop = self.stop(limits);

		(self, stop)
	}

	/// Upstream pages between the starting cursor and the last page that had posts.
	pub fn overrun(&self, start: u32) -> u32 {
		self.last_real_page.map(|page| page.saturating_sub(start)).unwrap_or(0)
	}

	/// Splits off everything past one client page.
	pub fn into_page(self, local_page_size: usize) -> (Vec<Post>, Vec<Post>) {
		let mut used = self.collected;
		let leftover =
			if used.len() > local_page_size { used.split_off(local_page_size) } else { Vec::new() };

		(used, leftover)
	}
}
